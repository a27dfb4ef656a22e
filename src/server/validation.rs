const MAX_USERNAME_LEN: usize = 32;
const MAX_NAME_LEN: usize = 100;

fn is_valid_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

pub fn validate_username(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Username cannot be empty".to_string());
    }
    if name.len() > MAX_USERNAME_LEN {
        return Err(format!(
            "Username cannot exceed {MAX_USERNAME_LEN} characters"
        ));
    }
    if !name.chars().all(is_valid_username_char) {
        return Err(
            "Username can only contain alphanumeric characters, hyphens, underscores, and periods"
                .to_string(),
        );
    }
    if name.starts_with('-') || name.starts_with('_') {
        return Err("Username cannot start with a hyphen or underscore".to_string());
    }
    Ok(())
}

/// Pages and groups share the same loose rules: any non-empty name up to
/// the length cap. Page names need not be unique.
fn validate_display_name(name: &str, entity: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err(format!("{entity} name cannot be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("{entity} name cannot exceed {MAX_NAME_LEN} characters"));
    }
    Ok(())
}

pub fn validate_page_name(name: &str) -> Result<(), String> {
    validate_display_name(name, "Page")
}

pub fn validate_group_name(name: &str) -> Result<(), String> {
    validate_display_name(name, "Group")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("alice.b-2").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("_alice").is_err());
        assert!(validate_username("al ice").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_display_names() {
        assert!(validate_page_name("Trading Desk").is_ok());
        assert!(validate_page_name("   ").is_err());
        assert!(validate_group_name(&"g".repeat(101)).is_err());
    }
}

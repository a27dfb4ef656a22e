use serde::{Deserialize, Serialize};

/// The grantee of a page permission: a single user or a whole group.
///
/// Stored as the `(subject_type, subject_id)` column pair; on the wire it
/// serializes to exactly those two fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "subject_type", content = "subject_id", rename_all = "snake_case")]
pub enum Subject {
    User(String),
    Group(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    User,
    Group,
}

impl Subject {
    pub fn user(id: impl Into<String>) -> Self {
        Subject::User(id.into())
    }

    pub fn group(id: impl Into<String>) -> Self {
        Subject::Group(id.into())
    }

    /// Reassembles a subject from its stored column pair.
    pub fn from_columns(kind: &str, id: String) -> Option<Self> {
        match kind {
            "user" => Some(Subject::User(id)),
            "group" => Some(Subject::Group(id)),
            _ => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> SubjectKind {
        match self {
            Subject::User(_) => SubjectKind::User,
            Subject::Group(_) => SubjectKind::Group,
        }
    }

    /// The `subject_type` column value.
    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        match self {
            Subject::User(_) => "user",
            Subject::Group(_) => "group",
        }
    }

    /// The `subject_id` column value.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Subject::User(id) | Subject::Group(id) => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let s = Subject::user("u-1");
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"subject_type": "user", "subject_id": "u-1"})
        );

        let back: Subject =
            serde_json::from_value(serde_json::json!({"subject_type": "group", "subject_id": "g-9"}))
                .unwrap();
        assert_eq!(back, Subject::group("g-9"));
    }

    #[test]
    fn test_from_columns() {
        assert_eq!(
            Subject::from_columns("user", "a".into()),
            Some(Subject::user("a"))
        );
        assert_eq!(
            Subject::from_columns("group", "b".into()),
            Some(Subject::group("b"))
        );
        assert_eq!(Subject::from_columns("robot", "c".into()), None);
    }

    #[test]
    fn test_column_accessors() {
        let s = Subject::group("g-1");
        assert_eq!(s.kind_str(), "group");
        assert_eq!(s.id(), "g-1");
        assert_eq!(s.kind(), SubjectKind::Group);
    }
}

mod jwt;
mod middleware;
mod password;

pub use jwt::{Claims, CredentialVerifier};
pub use middleware::{AuthError, RequireUser};
pub use password::PasswordHasher;

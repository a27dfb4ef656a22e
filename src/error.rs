use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("username already taken")]
    UsernameTaken,

    #[error("group name already taken")]
    GroupNameTaken,

    #[error("already a member of this group")]
    AlreadyMember,

    #[error("permission denied: {0}")]
    Forbidden(&'static str),

    #[error("page owner already has full access")]
    OwnerGrant,

    #[error("permission subject does not exist")]
    InvalidSubject,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("invalid credentials")]
    Unauthorized,

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

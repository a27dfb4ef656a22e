mod models;
mod subject;

pub use models::*;
pub use subject::{Subject, SubjectKind};

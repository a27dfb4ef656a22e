pub mod accounts;
pub mod dto;
pub mod groups;
pub mod pages;
pub mod response;
mod router;
pub mod validation;

pub use router::{AppState, create_router};

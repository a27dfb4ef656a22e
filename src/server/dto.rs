use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Subject, User, VisiblePage};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

impl TokenResponse {
    #[must_use]
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePageRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub is_owner: bool,
    pub can_edit: bool,
}

impl From<VisiblePage> for PageResponse {
    fn from(visible: VisiblePage) -> Self {
        Self {
            id: visible.page.id,
            name: visible.page.name,
            owner_id: visible.page.owner_id,
            created_at: visible.page.created_at,
            is_owner: visible.is_owner,
            can_edit: visible.can_edit,
        }
    }
}

fn default_can_view() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    #[serde(flatten)]
    pub subject: Subject,
    #[serde(default = "default_can_view")]
    pub can_view: bool,
    #[serde(default)]
    pub can_edit: bool,
}

fn default_events_limit() -> u32 {
    100
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_events_limit")]
    pub limit: u32,
}

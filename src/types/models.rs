use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Subject;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username: username.into(),
            password_hash: password_hash.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl Page {
    pub fn new(name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            owner_id: owner_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// One row of the page permission table. The owner never appears here;
/// ownership is resolved from the page itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagePermission {
    pub page_id: String,
    #[serde(flatten)]
    pub subject: Subject,
    pub can_view: bool,
    pub can_edit: bool,
}

/// A page as seen by one particular user, as returned by
/// `Store::list_pages_visible_to`.
#[derive(Debug, Clone)]
pub struct VisiblePage {
    pub page: Page,
    pub is_owner: bool,
    pub can_edit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alarm {
    pub id: String,
    pub page_id: String,
    pub ticker: String,
    pub option: String,
    pub condition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_name: Option<String>,
    pub created_by: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_triggered: Option<DateTime<Utc>>,
}

/// Partial update for an alarm. `page_id` and `created_by` are immutable;
/// absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlarmPatch {
    pub ticker: Option<String>,
    pub option: Option<String>,
    pub condition: Option<String>,
    pub active: Option<bool>,
}

impl AlarmPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticker.is_none()
            && self.option.is_none()
            && self.condition.is_none()
            && self.active.is_none()
    }
}

/// Append-only trigger audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub id: String,
    pub alarm_id: String,
    pub triggered_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub triggered_at: DateTime<Utc>,
}

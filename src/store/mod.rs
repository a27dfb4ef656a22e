mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use std::collections::HashSet;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface. Every mutating operation either
/// succeeds atomically or leaves no trace.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    // Group operations
    /// Creates the group and enrolls the creator as its first member in
    /// the same transaction.
    fn create_group(&self, group: &Group, creator_id: &str) -> Result<()>;
    fn get_group(&self, id: &str) -> Result<Option<Group>>;
    fn add_member(&self, group_id: &str, user_id: &str) -> Result<()>;
    fn remove_member(&self, group_id: &str, user_id: &str) -> Result<()>;
    fn is_member(&self, group_id: &str, user_id: &str) -> Result<bool>;
    fn list_groups_of_user(&self, user_id: &str) -> Result<HashSet<String>>;

    // Page operations
    fn create_page(&self, page: &Page) -> Result<()>;
    fn get_page(&self, id: &str) -> Result<Option<Page>>;
    /// Pages the user may see: owned, directly granted, or granted through
    /// a group. Feeds the initial snapshot.
    fn list_pages_visible_to(&self, user_id: &str) -> Result<Vec<VisiblePage>>;

    // Permission operations
    /// Inserts or replaces a grant row. Rejects a grant naming the page
    /// owner and grants whose subject does not exist.
    fn upsert_permission(&self, permission: &PagePermission) -> Result<()>;
    fn delete_permission(&self, page_id: &str, subject: &Subject) -> Result<bool>;
    fn list_permissions(&self, page_id: &str) -> Result<Vec<PagePermission>>;
    /// Pages on which the subject holds any grant row.
    fn list_pages_granted_to(&self, subject: &Subject) -> Result<Vec<Page>>;

    // Alarm operations
    fn create_alarm(&self, alarm: &Alarm) -> Result<()>;
    fn get_alarm(&self, id: &str) -> Result<Option<Alarm>>;
    fn update_alarm(&self, id: &str, patch: &AlarmPatch) -> Result<Option<Alarm>>;
    /// Returns the page id the alarm belonged to, for fan-out.
    fn delete_alarm(&self, id: &str) -> Result<Option<String>>;
    /// Stamps `last_triggered` and appends the audit event in one
    /// transaction.
    fn trigger_alarm(
        &self,
        id: &str,
        by_user_id: &str,
        price: Option<f64>,
    ) -> Result<Option<(Alarm, AlarmEvent)>>;
    fn list_alarms_in_pages(&self, page_ids: &[String]) -> Result<Vec<Alarm>>;
    fn list_alarm_events(&self, alarm_id: &str, limit: u32) -> Result<Vec<AlarmEvent>>;

    // Fan-out audience: the owner plus everyone granted view directly or
    // through group membership. Edit-only rows count; edit implies view.
    fn users_with_view_access(&self, page_id: &str) -> Result<HashSet<String>>;
}

//! Targeted fan-out.
//!
//! Every delivery resolves the page audience from the store at send time;
//! nothing here caches an authorization decision. Enqueueing never blocks:
//! a slow session is closed and detached instead of stalling the rest of
//! the audience.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::Message;

use super::protocol::{PageSnapshot, ServerEvent};
use super::registry::{SessionHandle, SessionRegistry};
use crate::authz::{self, Access};
use crate::error::Result;
use crate::store::Store;
use crate::types::Page;

#[derive(Clone)]
pub struct Broadcaster {
    store: Arc<dyn Store>,
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    pub fn new(store: Arc<dyn Store>, registry: Arc<SessionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Delivers one event to every session whose user may view the page.
    /// Invoked strictly after the committing transaction returns, so
    /// per-page delivery order matches commit order.
    pub fn page_event(&self, page_id: &str, event: &ServerEvent) -> Result<()> {
        let audience = self.store.users_with_view_access(page_id)?;
        self.send_to_users(&audience, event);
        Ok(())
    }

    pub fn send_to_users(&self, user_ids: &HashSet<String>, event: &ServerEvent) {
        self.deliver(self.registry.sessions_for(user_ids), event);
    }

    pub fn send_to_user(&self, user_id: &str, event: &ServerEvent) {
        self.deliver(self.registry.sessions_of(user_id), event);
    }

    fn deliver(&self, sessions: Vec<Arc<SessionHandle>>, event: &ServerEvent) {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("failed to encode broadcast frame: {e}");
                return;
            }
        };
        let frame = Message::Text(text.into());

        for session in sessions {
            if !session.send(frame.clone()) {
                // Dead or overflowing: no further deliveries to it.
                self.registry.detach(&session);
            }
        }
    }

    /// Fan-out for a permission or membership change: users entering the
    /// audience get a snapshot of the page and its alarms, users leaving
    /// it get a revocation notice. Everyone else hears nothing.
    pub fn push_access_diff(
        &self,
        page: &Page,
        before: &HashSet<String>,
        after: &HashSet<String>,
    ) -> Result<()> {
        let mut granted = after.difference(before).peekable();
        if granted.peek().is_some() {
            let alarms = self.store.list_alarms_in_pages(&[page.id.clone()])?;
            for user_id in granted {
                let access = self.resolve_access(user_id, page)?;
                let event = ServerEvent::PageAccessGranted {
                    page: PageSnapshot::for_access(page, access),
                    alarms: alarms.clone(),
                };
                self.send_to_user(user_id, &event);
            }
        }

        for user_id in before.difference(after) {
            self.send_to_user(
                user_id,
                &ServerEvent::PageAccessRevoked {
                    page_id: page.id.clone(),
                },
            );
        }
        Ok(())
    }

    /// Fresh resolution of one user's rights on one page.
    pub(crate) fn resolve_access(&self, user_id: &str, page: &Page) -> Result<Access> {
        let grants = self.store.list_permissions(&page.id)?;
        let groups = self.store.list_groups_of_user(user_id)?;
        Ok(authz::resolve(user_id, page, &grants, &groups))
    }
}

//! Inbound command execution.
//!
//! One command at a time per session: load, authorize against fresh store
//! reads, mutate, then hand the event to the broadcaster before the
//! session's turn ends. Business failures travel back to the initiator as
//! error frames and never close the connection.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use super::broadcast::Broadcaster;
use super::protocol::{AlarmAction, ClientCommand, ServerEvent};
use super::registry::SessionHandle;
use crate::error::{Error, Result};
use crate::server::validation;
use crate::store::Store;
use crate::types::{Alarm, AlarmPatch, Page, PagePermission, Subject};

pub struct CommandDispatcher {
    store: Arc<dyn Store>,
    broadcaster: Broadcaster,
}

impl CommandDispatcher {
    pub fn new(store: Arc<dyn Store>, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }

    /// Runs one command on behalf of the session identified by `session`.
    pub fn dispatch(&self, session: &Arc<SessionHandle>, command: ClientCommand) {
        let outcome = match command {
            ClientCommand::CreateAlarm {
                page_id,
                ticker,
                option,
                condition,
                strategy_id,
                strategy_name,
            } => self.create_alarm(
                session,
                page_id,
                ticker,
                option,
                condition,
                strategy_id,
                strategy_name,
            ),
            ClientCommand::UpdateAlarm { alarm_id, patch } => {
                self.update_alarm(session, &alarm_id, &patch)
            }
            ClientCommand::DeleteAlarm { alarm_id } => self.delete_alarm(session, &alarm_id),
            ClientCommand::TriggerAlarm { alarm_id, price } => {
                self.trigger_alarm(session, &alarm_id, price)
            }
            ClientCommand::CreatePage { name } => self.create_page(session, name),
            ClientCommand::SharePage {
                page_id,
                subject,
                can_view,
                can_edit,
            } => self.share_page(session, &page_id, subject, can_view, can_edit),
            ClientCommand::UnsharePage { page_id, subject } => {
                self.unshare_page(session, &page_id, subject)
            }
        };

        if let Err(e) = outcome {
            match &e {
                Error::Database(_) | Error::Io(_) | Error::Serialize(_) => {
                    tracing::error!(session = %session.id(), "command failed: {e}");
                    session.send_event(&ServerEvent::error("internal error"));
                }
                _ => {
                    session.send_event(&ServerEvent::error(e.to_string()));
                }
            }
        }
    }

    fn page(&self, page_id: &str) -> Result<Page> {
        self.store.get_page(page_id)?.ok_or(Error::NotFound("page"))
    }

    fn require_edit(&self, user_id: &str, page: &Page) -> Result<()> {
        if !self.broadcaster.resolve_access(user_id, page)?.edit {
            return Err(Error::Forbidden("cannot edit this page"));
        }
        Ok(())
    }

    fn require_view(&self, user_id: &str, page: &Page) -> Result<()> {
        if !self.broadcaster.resolve_access(user_id, page)?.view {
            return Err(Error::Forbidden("cannot access this page"));
        }
        Ok(())
    }

    fn require_share(&self, user_id: &str, page: &Page) -> Result<()> {
        if !self.broadcaster.resolve_access(user_id, page)?.share {
            return Err(Error::Forbidden("only the owner can share this page"));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn create_alarm(
        &self,
        session: &SessionHandle,
        page_id: String,
        ticker: String,
        option: String,
        condition: String,
        strategy_id: Option<String>,
        strategy_name: Option<String>,
    ) -> Result<()> {
        let page = self.page(&page_id)?;
        self.require_edit(session.user_id(), &page)?;

        let alarm = Alarm {
            id: Uuid::new_v4().to_string(),
            page_id: page.id.clone(),
            ticker,
            option,
            condition,
            strategy_id,
            strategy_name,
            created_by: session.user_id().to_string(),
            active: true,
            created_at: Utc::now(),
            last_triggered: None,
        };
        self.store.create_alarm(&alarm)?;

        self.broadcaster.page_event(
            &page.id,
            &ServerEvent::AlarmUpdate {
                alarm_id: alarm.id.clone(),
                page_id: page.id.clone(),
                action: AlarmAction::Created,
                data: serde_json::to_value(&alarm)?,
            },
        )
    }

    fn update_alarm(
        &self,
        session: &SessionHandle,
        alarm_id: &str,
        patch: &AlarmPatch,
    ) -> Result<()> {
        let alarm = self
            .store
            .get_alarm(alarm_id)?
            .ok_or(Error::NotFound("alarm"))?;
        let page = self.page(&alarm.page_id)?;
        self.require_edit(session.user_id(), &page)?;

        let updated = self
            .store
            .update_alarm(alarm_id, patch)?
            .ok_or(Error::NotFound("alarm"))?;

        self.broadcaster.page_event(
            &page.id,
            &ServerEvent::AlarmUpdate {
                alarm_id: updated.id.clone(),
                page_id: page.id.clone(),
                action: AlarmAction::Updated,
                data: serde_json::to_value(&updated)?,
            },
        )
    }

    fn delete_alarm(&self, session: &SessionHandle, alarm_id: &str) -> Result<()> {
        let alarm = self
            .store
            .get_alarm(alarm_id)?
            .ok_or(Error::NotFound("alarm"))?;
        let page = self.page(&alarm.page_id)?;
        self.require_edit(session.user_id(), &page)?;

        let page_id = self
            .store
            .delete_alarm(alarm_id)?
            .ok_or(Error::NotFound("alarm"))?;

        self.broadcaster.page_event(
            &page_id,
            &ServerEvent::AlarmUpdate {
                alarm_id: alarm.id.clone(),
                page_id: page_id.clone(),
                action: AlarmAction::Deleted,
                data: json!({"id": alarm.id, "page_id": page_id}),
            },
        )
    }

    fn trigger_alarm(
        &self,
        session: &SessionHandle,
        alarm_id: &str,
        price: Option<f64>,
    ) -> Result<()> {
        let alarm = self
            .store
            .get_alarm(alarm_id)?
            .ok_or(Error::NotFound("alarm"))?;
        let page = self.page(&alarm.page_id)?;
        // View suffices: any client watching the market may record the
        // trigger, editing rights are not required.
        self.require_view(session.user_id(), &page)?;

        let (alarm, event) = self
            .store
            .trigger_alarm(alarm_id, session.user_id(), price)?
            .ok_or(Error::NotFound("alarm"))?;

        let mut data = serde_json::to_value(&alarm)?;
        if let Value::Object(map) = &mut data {
            map.insert("price".into(), json!(event.price));
            map.insert("triggered_by".into(), json!(event.triggered_by));
            map.insert("triggered_at".into(), json!(event.triggered_at));
        }

        self.broadcaster.page_event(
            &page.id,
            &ServerEvent::AlarmUpdate {
                alarm_id: alarm.id.clone(),
                page_id: page.id.clone(),
                action: AlarmAction::Triggered,
                data,
            },
        )
    }

    fn create_page(&self, session: &SessionHandle, name: String) -> Result<()> {
        validation::validate_page_name(&name).map_err(Error::Malformed)?;

        let page = Page::new(name, session.user_id());
        self.store.create_page(&page)?;

        // No one else can see the page yet; confirm to the initiator only.
        session.send_event(&ServerEvent::Success {
            action: "page_created",
            data: json!({"id": page.id, "name": page.name, "owner_id": page.owner_id}),
        });
        Ok(())
    }

    fn share_page(
        &self,
        session: &SessionHandle,
        page_id: &str,
        subject: Subject,
        can_view: bool,
        can_edit: bool,
    ) -> Result<()> {
        let page = self.page(page_id)?;
        self.require_share(session.user_id(), &page)?;

        let before = self.store.users_with_view_access(&page.id)?;
        self.store.upsert_permission(&PagePermission {
            page_id: page.id.clone(),
            subject: subject.clone(),
            can_view,
            can_edit,
        })?;
        let after = self.store.users_with_view_access(&page.id)?;

        self.broadcaster.push_access_diff(&page, &before, &after)?;

        session.send_event(&ServerEvent::Success {
            action: "page_shared",
            data: json!({
                "page_id": page.id,
                "subject_type": subject.kind_str(),
                "subject_id": subject.id(),
            }),
        });
        Ok(())
    }

    fn unshare_page(
        &self,
        session: &SessionHandle,
        page_id: &str,
        subject: Subject,
    ) -> Result<()> {
        let page = self.page(page_id)?;
        self.require_share(session.user_id(), &page)?;

        let before = self.store.users_with_view_access(&page.id)?;
        if !self.store.delete_permission(&page.id, &subject)? {
            return Err(Error::NotFound("permission"));
        }
        let after = self.store.users_with_view_access(&page.id)?;

        self.broadcaster.push_access_diff(&page, &before, &after)?;

        session.send_event(&ServerEvent::Success {
            action: "page_unshared",
            data: json!({
                "page_id": page.id,
                "subject_type": subject.kind_str(),
                "subject_id": subject.id(),
            }),
        });
        Ok(())
    }
}

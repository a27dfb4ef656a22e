//! Wire frames for the duplex channel.
//!
//! Both directions share the `{type, payload}` envelope. Commands are
//! decoded once at the boundary into a closed sum; the dispatcher matches
//! exhaustively.

use serde::{Deserialize, Serialize};

use crate::authz::Access;
use crate::types::{Alarm, AlarmPatch, Page, Subject, VisiblePage};

fn default_can_view() -> bool {
    true
}

/// Client → server commands.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientCommand {
    CreateAlarm {
        page_id: String,
        ticker: String,
        option: String,
        condition: String,
        #[serde(default)]
        strategy_id: Option<String>,
        #[serde(default)]
        strategy_name: Option<String>,
    },
    UpdateAlarm {
        alarm_id: String,
        #[serde(flatten)]
        patch: AlarmPatch,
    },
    DeleteAlarm {
        alarm_id: String,
    },
    TriggerAlarm {
        alarm_id: String,
        #[serde(default)]
        price: Option<f64>,
    },
    CreatePage {
        name: String,
    },
    SharePage {
        page_id: String,
        #[serde(flatten)]
        subject: Subject,
        #[serde(default = "default_can_view")]
        can_view: bool,
        #[serde(default)]
        can_edit: bool,
    },
    UnsharePage {
        page_id: String,
        #[serde(flatten)]
        subject: Subject,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmAction {
    Created,
    Updated,
    Deleted,
    Triggered,
}

/// The user block of the initial snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub id: String,
    pub username: String,
}

/// A page as presented to one receiving user.
#[derive(Debug, Clone, Serialize)]
pub struct PageSnapshot {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub is_owner: bool,
    pub can_edit: bool,
}

impl PageSnapshot {
    pub fn from_visible(visible: &VisiblePage) -> Self {
        Self {
            id: visible.page.id.clone(),
            name: visible.page.name.clone(),
            owner_id: visible.page.owner_id.clone(),
            is_owner: visible.is_owner,
            can_edit: visible.can_edit,
        }
    }

    pub fn for_access(page: &Page, access: Access) -> Self {
        Self {
            id: page.id.clone(),
            name: page.name.clone(),
            owner_id: page.owner_id.clone(),
            is_owner: access.share,
            can_edit: access.edit,
        }
    }
}

/// Server → client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent exactly once, immediately after authentication.
    InitialState {
        user: SessionUser,
        pages: Vec<PageSnapshot>,
        alarms: Vec<Alarm>,
    },
    /// Broadcast to the page audience on every alarm mutation.
    AlarmUpdate {
        alarm_id: String,
        page_id: String,
        action: AlarmAction,
        data: serde_json::Value,
    },
    /// Sent to a user the moment they gain view access to a page.
    PageAccessGranted {
        page: PageSnapshot,
        alarms: Vec<Alarm>,
    },
    PageAccessRevoked {
        page_id: String,
    },
    /// Confirmation to the initiator only.
    Success {
        action: &'static str,
        data: serde_json::Value,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_create_alarm() {
        let raw = r#"{"type":"create_alarm","payload":{"page_id":"p1","ticker":"EUR/USD","option":"spot","condition":"above"}}"#;
        let cmd: ClientCommand = serde_json::from_str(raw).unwrap();
        match cmd {
            ClientCommand::CreateAlarm {
                page_id,
                ticker,
                strategy_id,
                ..
            } => {
                assert_eq!(page_id, "p1");
                assert_eq!(ticker, "EUR/USD");
                assert!(strategy_id.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_decode_update_alarm_partial_patch() {
        let raw = r#"{"type":"update_alarm","payload":{"alarm_id":"a1","ticker":"GBP/USD"}}"#;
        let cmd: ClientCommand = serde_json::from_str(raw).unwrap();
        match cmd {
            ClientCommand::UpdateAlarm { alarm_id, patch } => {
                assert_eq!(alarm_id, "a1");
                assert_eq!(patch.ticker.as_deref(), Some("GBP/USD"));
                assert!(patch.option.is_none());
                assert!(patch.active.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_decode_empty_patch() {
        let raw = r#"{"type":"update_alarm","payload":{"alarm_id":"a1"}}"#;
        let cmd: ClientCommand = serde_json::from_str(raw).unwrap();
        match cmd {
            ClientCommand::UpdateAlarm { patch, .. } => assert!(patch.is_empty()),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_decode_share_page_defaults() {
        let raw = r#"{"type":"share_page","payload":{"page_id":"p1","subject_type":"user","subject_id":"u2"}}"#;
        let cmd: ClientCommand = serde_json::from_str(raw).unwrap();
        match cmd {
            ClientCommand::SharePage {
                subject,
                can_view,
                can_edit,
                ..
            } => {
                assert_eq!(subject, Subject::user("u2"));
                assert!(can_view);
                assert!(!can_edit);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let raw = r#"{"type":"evaluate_alarm","payload":{}}"#;
        assert!(serde_json::from_str::<ClientCommand>(raw).is_err());
    }

    #[test]
    fn test_missing_field_rejected() {
        let raw = r#"{"type":"create_alarm","payload":{"ticker":"EUR/USD"}}"#;
        assert!(serde_json::from_str::<ClientCommand>(raw).is_err());
    }

    #[test]
    fn test_encode_alarm_update_envelope() {
        let event = ServerEvent::AlarmUpdate {
            alarm_id: "a1".into(),
            page_id: "p1".into(),
            action: AlarmAction::Created,
            data: json!({"id": "a1"}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "alarm_update");
        assert_eq!(value["payload"]["action"], "created");
        assert_eq!(value["payload"]["page_id"], "p1");
    }

    #[test]
    fn test_encode_error_envelope() {
        let value = serde_json::to_value(ServerEvent::error("permission denied")).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["payload"]["message"], "permission denied");
    }
}

//! Process-local index of live sessions.
//!
//! The registry only guards an index; no domain state lives here. A user
//! may hold any number of concurrent sessions and every one of them
//! receives that user's frames.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::protocol::ServerEvent;

/// Last frame attempted on an overflowing session before it is torn down.
const BACKPRESSURE_FRAME: &str =
    r#"{"type":"error","payload":{"message":"backpressure, disconnecting"}}"#;

/// Outbound half of one live connection. Sends never block: a full queue
/// means the peer is too slow and the session is cancelled instead.
pub struct SessionHandle {
    id: Uuid,
    user_id: String,
    username: String,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>, tx: mpsc::Sender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            username: username.into(),
            tx,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Non-blocking enqueue. On overflow the session is marked dead: a
    /// best-effort backpressure notice is attempted and the cancellation
    /// token fires so both pump tasks unwind. Returns false once the
    /// session is no longer usable.
    pub fn send(&self, frame: Message) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    session = %self.id,
                    user = %self.user_id,
                    "outbound queue full, disconnecting slow session"
                );
                let _ = self.tx.try_send(Message::Text(BACKPRESSURE_FRAME.into()));
                self.cancel.cancel();
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.cancel.cancel();
                false
            }
        }
    }

    pub fn send_event(&self, event: &ServerEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(text) => self.send(Message::Text(text.into())),
            Err(e) => {
                tracing::error!(session = %self.id, "failed to encode frame: {e}");
                true
            }
        }
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the session has been cancelled (by either pump task,
    /// the broadcaster, or backpressure teardown).
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// user_id → (session id → handle). The handle carries its own user id,
/// so detach is O(1) without a separate reverse table.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<HashMap<String, HashMap<Uuid, Arc<SessionHandle>>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, handle: Arc<SessionHandle>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .entry(handle.user_id().to_string())
            .or_default()
            .insert(handle.id(), handle.clone());
    }

    pub fn detach(&self, handle: &SessionHandle) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sessions) = inner.get_mut(handle.user_id()) {
            sessions.remove(&handle.id());
            if sessions.is_empty() {
                inner.remove(handle.user_id());
            }
        }
    }

    /// Every live session belonging to any of the given users.
    #[must_use]
    pub fn sessions_for(&self, user_ids: &HashSet<String>) -> Vec<Arc<SessionHandle>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        user_ids
            .iter()
            .filter_map(|id| inner.get(id))
            .flat_map(|sessions| sessions.values().cloned())
            .collect()
    }

    #[must_use]
    pub fn sessions_of(&self, user_id: &str) -> Vec<Arc<SessionHandle>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .get(user_id)
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(user: &str, capacity: usize) -> (Arc<SessionHandle>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(SessionHandle::new(user, user, tx)), rx)
    }

    #[tokio::test]
    async fn test_attach_detach() {
        let registry = SessionRegistry::new();
        let (h, _rx) = handle("alice", 8);

        registry.attach(h.clone());
        assert_eq!(registry.sessions_of("alice").len(), 1);

        registry.detach(&h);
        assert!(registry.sessions_of("alice").is_empty());
    }

    #[tokio::test]
    async fn test_multiple_sessions_per_user() {
        let registry = SessionRegistry::new();
        let (h1, _rx1) = handle("alice", 8);
        let (h2, _rx2) = handle("alice", 8);

        registry.attach(h1.clone());
        registry.attach(h2.clone());
        assert_eq!(registry.sessions_of("alice").len(), 2);

        registry.detach(&h1);
        let remaining = registry.sessions_of("alice");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id(), h2.id());
    }

    #[tokio::test]
    async fn test_sessions_for_filters_by_audience() {
        let registry = SessionRegistry::new();
        let (alice, _rx1) = handle("alice", 8);
        let (bob, _rx2) = handle("bob", 8);
        let (carol, _rx3) = handle("carol", 8);

        registry.attach(alice);
        registry.attach(bob.clone());
        registry.attach(carol);

        let audience: HashSet<String> = ["alice".to_string(), "bob".to_string()]
            .into_iter()
            .collect();
        let sessions = registry.sessions_for(&audience);
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.user_id() != "carol"));
    }

    #[tokio::test]
    async fn test_overflow_cancels_session() {
        let (h, mut rx) = handle("alice", 2);

        assert!(h.send(Message::Text("1".into())));
        assert!(h.send(Message::Text("2".into())));
        // Queue is full: this send fails and the session dies.
        assert!(!h.send(Message::Text("3".into())));
        assert!(h.is_closed());

        // Subsequent sends are refused outright.
        assert!(!h.send(Message::Text("4".into())));

        // The frames that made it in are still drainable in order.
        assert!(matches!(rx.recv().await, Some(Message::Text(t)) if t.as_str() == "1"));
        assert!(matches!(rx.recv().await, Some(Message::Text(t)) if t.as_str() == "2"));
    }

    #[tokio::test]
    async fn test_send_event_serializes_envelope() {
        let (h, mut rx) = handle("alice", 8);
        assert!(h.send_event(&ServerEvent::error("nope")));

        let Some(Message::Text(text)) = rx.recv().await else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["payload"]["message"], "nope");
    }
}

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{get, post, put},
};

use super::{accounts, groups, pages};
use crate::auth::{CredentialVerifier, PasswordHasher};
use crate::store::Store;
use crate::ws;
use crate::ws::{Broadcaster, CommandDispatcher, SessionRegistry};

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<SessionRegistry>,
    pub broadcaster: Broadcaster,
    pub dispatcher: CommandDispatcher,
    pub credentials: CredentialVerifier,
    pub passwords: PasswordHasher,
    /// Bound on each session's outbound queue. Overflow closes the session.
    pub send_queue_depth: usize,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        credentials: CredentialVerifier,
        send_queue_depth: usize,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Broadcaster::new(store.clone(), registry.clone());
        let dispatcher = CommandDispatcher::new(store.clone(), broadcaster.clone());

        Self {
            store,
            registry,
            broadcaster,
            dispatcher,
            credentials,
            passwords: PasswordHasher::new(),
            send_queue_depth: send_queue_depth.max(1),
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        // Accounts
        .route("/register", post(accounts::register))
        .route("/login", post(accounts::login))
        .route("/me", get(accounts::me))
        // Groups and membership
        .route("/groups", post(groups::create_group))
        .route(
            "/groups/{group_id}/members/{user_id}",
            put(groups::add_member).delete(groups::remove_member),
        )
        // Pages and permissions
        .route("/pages", post(pages::create_page).get(pages::list_pages))
        .route(
            "/pages/{page_id}/permissions",
            put(pages::upsert_permission).get(pages::list_permissions),
        )
        .route(
            "/pages/{page_id}/permissions/{subject_type}/{subject_id}",
            axum::routing::delete(pages::delete_permission),
        )
        // Alarm history
        .route("/alarms/{alarm_id}/events", get(pages::list_alarm_events))
        // Real-time channel
        .route("/ws", get(ws::lifecycle::ws_handler))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

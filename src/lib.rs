//! # Klaxon
//!
//! A real-time coordination server for shared market alarms. Clients keep
//! a websocket open; every alarm change is persisted to SQLite and pushed
//! to exactly the set of connected users allowed to see the affected
//! page. The server is the single source of truth for alarm state,
//! membership, and access control; clients are never trusted to filter.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use klaxon::auth::CredentialVerifier;
//! use klaxon::server::{AppState, create_router};
//! use klaxon::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/klaxon.db").unwrap();
//! store.initialize().unwrap();
//!
//! let credentials = CredentialVerifier::new("secret", 60);
//! let state = Arc::new(AppState::new(Arc::new(store), credentials, 64));
//! let router = create_router(state);
//! // Serve with axum...
//! ```

pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod types;
pub mod ws;

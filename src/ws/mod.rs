//! The duplex session layer: one websocket per client, authenticated at
//! upgrade, snapshot on entry, targeted fan-out on every committed change.

pub mod broadcast;
pub mod dispatch;
pub mod lifecycle;
pub mod protocol;
pub mod registry;

pub use broadcast::Broadcaster;
pub use dispatch::CommandDispatcher;
pub use registry::{SessionHandle, SessionRegistry};

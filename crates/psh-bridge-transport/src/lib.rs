//! Transport layer for the bridge.
//!
//! Provides:
//! - Wire protocol (JSON + base64)
//! - Per-connection channel pool
//! - Tokio waitable scheduler
//! - Request dispatcher
//! - WebSocket transport (feature: websocket)

pub mod channel;
pub mod dispatcher;
pub mod protocol;
pub mod scheduler;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use channel::{ChannelPool, PoolChannel};
pub use dispatcher::{BridgeState, Dispatcher};
pub use protocol::{ClientMessage, ServerMessage};
pub use scheduler::TokioScheduler;

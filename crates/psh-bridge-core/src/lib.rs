//! Core types for bridging host requests into an embedded scripting runtime.
//!
//! This crate provides the shared building blocks:
//! - `Status` / `StatusCode` - Numeric status for response envelopes
//! - `ReadinessSignal` - Auto-reset event between writers and the scheduler
//! - `OutputAccumulator` - Pending interactive output
//! - `Invocation` / `Variant` - One command/result exchange
//! - `BridgeConfig` - Shared configuration
//! - Channel, scheduler and invoker traits

pub mod accumulator;
pub mod config;
pub mod invocation;
pub mod signal;
pub mod status;
pub mod traits;

pub use accumulator::OutputAccumulator;
pub use config::{BridgeConfig, ConfigError};
pub use invocation::{Invocation, Variant};
pub use signal::ReadinessSignal;
pub use status::{Status, StatusCode};
pub use traits::{
    BackendError, BridgeError, Channel, ChannelError, ChannelFlags, ChannelId, ChannelOps,
    CommandInvoker, HostState, InvocationError, Scheduler, SchedulerError, WaitableHandler,
    WaitableId, WaitableSignal,
};

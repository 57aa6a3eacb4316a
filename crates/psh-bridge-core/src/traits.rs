//! Core traits for command invocation, channels and scheduling.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{ReadinessSignal, Status, StatusCode};

/// Channel identifier.
pub type ChannelId = u32;

/// Waitable identifier (the identity of its readiness signal).
pub type WaitableId = Uuid;

/// Runtime host lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    /// Nothing loaded yet.
    Uninitialized,
    /// The load chain is running.
    Initializing,
    /// Runtime loaded, dispatch object resolved.
    Ready,
    /// The load chain failed; there is no retry.
    Failed,
    /// Handles released; terminal.
    TornDown,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::TornDown => "torn down",
        };
        f.write_str(name)
    }
}

/// Failure reported by the embedded runtime.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} ({status})")]
pub struct BackendError {
    /// Code reported by the runtime for the failing call.
    pub status: Status,
    /// Human readable detail.
    pub message: String,
}

impl BackendError {
    /// Create a backend error.
    #[must_use]
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl StatusCode for BackendError {
    fn status(&self) -> Status {
        self.status
    }
}

/// Invocation error.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Runtime host is {0}")]
    NotReady(HostState),
    #[error("Command cannot be marshalled: {0}")]
    Marshal(String),
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] BackendError),
    #[error("Dispatch returned {0} instead of a string")]
    UnexpectedReturn(&'static str),
}

impl StatusCode for InvocationError {
    fn status(&self) -> Status {
        match self {
            Self::NotReady(_) => Status::NOT_READY,
            Self::Marshal(_) => Status::E_INVALIDARG,
            Self::Dispatch(e) => e.status(),
            Self::UnexpectedReturn(_) => Status::DISP_E_TYPEMISMATCH,
        }
    }
}

/// Channel error.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Channel not found: {0}")]
    NotFound(ChannelId),
    #[error("Channel is closed")]
    Closed,
    #[error("Channel is not interacting")]
    NotInteracting,
    #[error("Failed to allocate channel state")]
    AllocationFailed,
    #[error("Channel peer disconnected")]
    Disconnected,
    #[error("Invalid channel data: {0}")]
    InvalidData(String),
}

impl StatusCode for ChannelError {
    fn status(&self) -> Status {
        match self {
            Self::MissingParameter(_) | Self::InvalidData(_) => Status::INVALID_PARAMETER,
            Self::NotFound(_) => Status::NOT_FOUND,
            Self::Closed => Status::INVALID_HANDLE,
            Self::NotInteracting => Status::INVALID_STATE,
            Self::AllocationFailed => Status::OUT_OF_MEMORY,
            Self::Disconnected => Status::BROKEN_PIPE,
        }
    }
}

/// Scheduler error.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Waitable not registered: {0}")]
    UnknownWaitable(WaitableId),
    #[error("Waitable already registered: {0}")]
    AlreadyRegistered(WaitableId),
    #[error("Scheduler is not running")]
    Stopped,
}

impl StatusCode for SchedulerError {
    fn status(&self) -> Status {
        match self {
            Self::UnknownWaitable(_) => Status::NOT_FOUND,
            Self::AlreadyRegistered(_) => Status::ALREADY_EXISTS,
            Self::Stopped => Status::NOT_READY,
        }
    }
}

/// Any failure surfaced by a channel operation.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl StatusCode for BridgeError {
    fn status(&self) -> Status {
        match self {
            Self::Invocation(e) => e.status(),
            Self::Channel(e) => e.status(),
            Self::Scheduler(e) => e.status(),
        }
    }
}

/// Something that runs one command and returns its output.
///
/// Implemented by the runtime host; sessions only see this trait so tests
/// can substitute a fake.
pub trait CommandInvoker: Send + Sync {
    /// Run `command` and return its result text.
    ///
    /// # Errors
    /// Returns error if the host is not ready or the dispatch call fails.
    fn invoke(&self, command: &str) -> Result<String, InvocationError>;
}

/// Channel creation flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelFlags {
    /// Writes are handled inline by the channel's ops.
    pub synchronous: bool,
}

impl ChannelFlags {
    pub const SYNCHRONOUS: Self = Self { synchronous: true };
}

/// A channel as seen by the code that owns its ops.
pub trait Channel: Send + Sync {
    /// Channel identifier.
    fn id(&self) -> ChannelId;

    /// Deliver `data` to the remote end as one message.
    ///
    /// # Errors
    /// Returns error if the remote end is gone.
    fn write(&self, data: &[u8]) -> Result<(), ChannelError>;

    /// Tag the channel with a type name.
    fn set_type(&self, tag: &str);

    /// Current type tag, if any.
    fn channel_type(&self) -> Option<String>;
}

/// Operations a channel forwards to its owner.
pub trait ChannelOps: Send + Sync {
    /// Handle data written to the channel by the remote end.
    ///
    /// # Errors
    /// Returns error if the data could not be processed.
    fn write(&self, channel: &dyn Channel, buffer: &[u8]) -> Result<usize, BridgeError>;

    /// Start (`true`) or pause (`false`) interactive delivery.
    ///
    /// # Errors
    /// Returns error if the scheduler rejects the change.
    fn interact(&self, channel: Arc<dyn Channel>, start: bool) -> Result<(), BridgeError>;

    /// The channel is being closed.
    ///
    /// # Errors
    /// Returns error if teardown fails.
    fn close(&self, channel: &dyn Channel) -> Result<(), BridgeError>;
}

/// Control signals for a registered waitable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitableSignal {
    /// Stop dispatching notifications.
    Pause,
    /// Resume dispatching notifications.
    Resume,
    /// Deregister; destroy runs afterwards.
    Remove,
}

/// Callbacks invoked by the scheduler for one waitable.
pub trait WaitableHandler: Send + Sync {
    /// The readiness signal fired.
    ///
    /// # Errors
    /// Returns error if delivery failed; the scheduler logs it.
    fn notify(&self) -> Result<(), BridgeError>;

    /// The waitable is being torn down.
    fn destroy(&self);
}

/// Wait/notify scheduler.
pub trait Scheduler: Send + Sync {
    /// Register `signal` and dispatch `handler.notify` whenever it fires.
    ///
    /// # Errors
    /// Returns error if the signal is already registered or the scheduler stopped.
    fn insert_waitable(
        &self,
        signal: Arc<ReadinessSignal>,
        handler: Arc<dyn WaitableHandler>,
    ) -> Result<(), SchedulerError>;

    /// Pause, resume or remove a registered waitable.
    ///
    /// # Errors
    /// Returns error if the waitable is unknown.
    fn signal_waitable(&self, id: WaitableId, signal: WaitableSignal)
    -> Result<(), SchedulerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameter_maps_to_invalid_parameter() {
        let err = BridgeError::from(ChannelError::MissingParameter("code"));
        assert_eq!(err.status(), Status::INVALID_PARAMETER);
    }

    #[test]
    fn test_dispatch_keeps_runtime_code() {
        let err = InvocationError::from(BackendError::new(Status::DISP_E_EXCEPTION, "boom"));
        assert_eq!(err.status(), Status::DISP_E_EXCEPTION);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_not_ready_status() {
        let err = InvocationError::NotReady(HostState::TornDown);
        assert_eq!(err.status(), Status::NOT_READY);
        assert_eq!(err.to_string(), "Runtime host is torn down");
    }
}

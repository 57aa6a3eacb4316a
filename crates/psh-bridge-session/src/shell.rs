//! Interactive shell session state.

use std::{
    borrow::Cow,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use psh_bridge_core::{
    BridgeError, Channel, ChannelError, ChannelOps, CommandInvoker, OutputAccumulator,
    ReadinessSignal, Scheduler,
};

use crate::adapter::{self, ShellWaitable};

/// Operational mode of a shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellMode {
    /// Created; no readiness signal yet.
    Idle,
    /// Registered with the scheduler and delivering output.
    Armed,
    /// Registered, delivery suspended.
    Paused,
    /// Channel closed; terminal.
    Closed,
}

struct ShellState {
    mode: ShellMode,
    signal: Option<Arc<ReadinessSignal>>,
}

/// State shared between the shell and its scheduler callbacks.
pub struct ShellShared {
    pub(crate) prompt: String,
    pub(crate) output: OutputAccumulator,
    state: Mutex<ShellState>,
}

impl ShellShared {
    fn lock(&self) -> MutexGuard<'_, ShellState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn signal(&self) -> Option<Arc<ReadinessSignal>> {
        self.lock().signal.clone()
    }

    pub(crate) fn take_signal(&self) -> Option<Arc<ReadinessSignal>> {
        self.lock().signal.take()
    }
}

/// One interactive shell attached to a channel.
///
/// Each write runs one command; its result plus the prompt marker is queued
/// and the readiness signal raised. The scheduler's notify callback
/// delivers the queue to the channel.
pub struct InteractiveShell {
    invoker: Arc<dyn CommandInvoker>,
    scheduler: Arc<dyn Scheduler>,
    shared: Arc<ShellShared>,
}

impl fmt::Debug for InteractiveShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractiveShell")
            .field("mode", &self.mode())
            .field("pending", &self.shared.output.len())
            .finish_non_exhaustive()
    }
}

impl InteractiveShell {
    /// Create an idle shell.
    #[must_use]
    pub fn new(
        invoker: Arc<dyn CommandInvoker>,
        scheduler: Arc<dyn Scheduler>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            invoker,
            scheduler,
            shared: Arc::new(ShellShared {
                prompt: prompt.into(),
                output: OutputAccumulator::new(),
                state: Mutex::new(ShellState {
                    mode: ShellMode::Idle,
                    signal: None,
                }),
            }),
        }
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> ShellMode {
        self.shared.lock().mode
    }

    /// Prompt marker appended after each result.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.shared.prompt
    }

    /// Output queued for the next notification.
    #[must_use]
    pub fn pending_output(&self) -> Vec<u8> {
        self.shared.output.snapshot()
    }

    /// Whether a readiness signal is currently held.
    #[must_use]
    pub fn has_signal(&self) -> bool {
        self.shared.lock().signal.is_some()
    }
}

/// Command text carried by a channel write: up to the first NUL.
fn command_text(buffer: &[u8]) -> Cow<'_, str> {
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    String::from_utf8_lossy(&buffer[..end])
}

impl ChannelOps for InteractiveShell {
    fn write(&self, channel: &dyn Channel, buffer: &[u8]) -> Result<usize, BridgeError> {
        if self.mode() == ShellMode::Closed {
            return Err(ChannelError::Closed.into());
        }

        let command = command_text(buffer);
        tracing::debug!(channel = channel.id(), command = %command, "Executing command");

        let result = self.invoker.invoke(&command)?;
        self.shared.output.push_result(&result, &self.shared.prompt);
        if let Some(signal) = self.shared.signal() {
            signal.set();
        }
        Ok(buffer.len())
    }

    fn interact(&self, channel: Arc<dyn Channel>, start: bool) -> Result<(), BridgeError> {
        let mut state = self.shared.lock();
        if state.mode == ShellMode::Closed {
            return Err(ChannelError::Closed.into());
        }

        if !start {
            let Some(signal) = state.signal.as_ref() else {
                return Err(ChannelError::NotInteracting.into());
            };
            tracing::debug!(channel = channel.id(), "Pausing interaction");
            adapter::pause(&*self.scheduler, signal)?;
            state.mode = ShellMode::Paused;
            return Ok(());
        }

        if let Some(signal) = state.signal.as_ref() {
            tracing::debug!(channel = channel.id(), "Resuming interaction");
            adapter::resume(&*self.scheduler, signal)?;
        } else {
            tracing::debug!(channel = channel.id(), "Beginning interaction");
            let signal = Arc::new(ReadinessSignal::new());
            let handler = Arc::new(ShellWaitable::new(channel, Arc::clone(&self.shared)));
            adapter::arm(&*self.scheduler, Arc::clone(&signal), handler)?;
            signal.set();
            state.signal = Some(signal);
        }
        state.mode = ShellMode::Armed;
        Ok(())
    }

    fn close(&self, channel: &dyn Channel) -> Result<(), BridgeError> {
        let signal = {
            let mut state = self.shared.lock();
            if state.mode == ShellMode::Closed {
                return Ok(());
            }
            state.mode = ShellMode::Closed;
            state.signal.take()
        };

        tracing::debug!(channel = channel.id(), "Closing shell");
        if let Some(signal) = signal {
            signal.release();
            adapter::remove(&*self.scheduler, &signal);
        }
        self.shared.output.clear();
        Ok(())
    }
}

//! Scheduler callbacks and registration for interactive shells.

use std::sync::Arc;

use psh_bridge_core::{
    BridgeError, Channel, ReadinessSignal, Scheduler, SchedulerError, WaitableHandler,
    WaitableSignal,
};

use crate::shell::ShellShared;

/// Waitable pairing one shell's output with the channel it is attached to.
pub struct ShellWaitable {
    channel: Arc<dyn Channel>,
    shared: Arc<ShellShared>,
}

impl ShellWaitable {
    pub(crate) const fn new(channel: Arc<dyn Channel>, shared: Arc<ShellShared>) -> Self {
        Self { channel, shared }
    }
}

impl WaitableHandler for ShellWaitable {
    fn notify(&self) -> Result<(), BridgeError> {
        // Lower the signal before draining: a write that lands after the
        // drain raises it again instead of being lost.
        if let Some(signal) = self.shared.signal() {
            signal.reset();
        }

        let Some(pending) = self
            .shared
            .output
            .drain_if_longer_than(self.shared.prompt.len())
        else {
            return Ok(());
        };

        tracing::trace!(
            channel = self.channel.id(),
            bytes = pending.len(),
            "Flushing shell output"
        );
        self.channel.write(&pending)?;
        Ok(())
    }

    fn destroy(&self) {
        tracing::debug!(channel = self.channel.id(), "Finalising interaction");
        if let Some(signal) = self.shared.take_signal() {
            signal.release();
        }
    }
}

/// Register `signal` for `handler`.
pub(crate) fn arm(
    scheduler: &dyn Scheduler,
    signal: Arc<ReadinessSignal>,
    handler: Arc<ShellWaitable>,
) -> Result<(), SchedulerError> {
    scheduler.insert_waitable(signal, handler)
}

/// Stop notifications without releasing the signal.
pub(crate) fn pause(scheduler: &dyn Scheduler, signal: &ReadinessSignal) -> Result<(), SchedulerError> {
    scheduler.signal_waitable(signal.id(), WaitableSignal::Pause)
}

/// Restart notifications and flush whatever is pending.
pub(crate) fn resume(
    scheduler: &dyn Scheduler,
    signal: &ReadinessSignal,
) -> Result<(), SchedulerError> {
    scheduler.signal_waitable(signal.id(), WaitableSignal::Resume)?;
    signal.set();
    Ok(())
}

/// Deregister; the scheduler runs destroy afterwards.
pub(crate) fn remove(scheduler: &dyn Scheduler, signal: &ReadinessSignal) {
    if let Err(e) = scheduler.signal_waitable(signal.id(), WaitableSignal::Remove) {
        tracing::debug!("Waitable already gone: {e}");
    }
}

//! Auto-resetting readiness signal shared between writers and the scheduler.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use uuid::Uuid;

use crate::traits::WaitableId;

/// Binary, auto-resetting event.
///
/// Raising an already raised signal is a no-op, so raises coalesce. A
/// successful [`wait`](Self::wait) consumes the raise. Once released the
/// signal never fires again and waiters return `false`.
#[derive(Debug)]
pub struct ReadinessSignal {
    id: WaitableId,
    raised: AtomicBool,
    released: AtomicBool,
    notify: Notify,
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessSignal {
    /// Create a lowered signal with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            raised: AtomicBool::new(false),
            released: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Identity used to address the signal's scheduler entry.
    #[must_use]
    pub const fn id(&self) -> WaitableId {
        self.id
    }

    /// Raise the signal.
    pub fn set(&self) {
        if self.is_released() {
            return;
        }
        self.raised.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Lower the signal without waking anyone.
    pub fn reset(&self) {
        self.raised.store(false, Ordering::Release);
    }

    /// Whether the signal is currently raised.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Release the signal. Returns `false` if it was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.raised.store(false, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
        true
    }

    /// Whether [`release`](Self::release) has been called.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Wait until the signal is raised, consuming the raise.
    ///
    /// Returns `false` once the signal has been released.
    pub async fn wait(&self) -> bool {
        loop {
            let notified = self.notify.notified();
            if self.is_released() {
                return false;
            }
            if self.raised.swap(false, Ordering::AcqRel) {
                return true;
            }
            notified.await;
        }
    }
}

//! Waitable scheduler running one tokio task per registered signal.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use psh_bridge_core::{
    ReadinessSignal, Scheduler, SchedulerError, WaitableHandler, WaitableId, WaitableSignal,
};
use tokio::{runtime::Handle, sync::mpsc};

type Controls = HashMap<WaitableId, mpsc::UnboundedSender<WaitableSignal>>;
type Registry = Arc<Mutex<Controls>>;

fn lock(registry: &Registry) -> MutexGuard<'_, Controls> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dispatches `notify` whenever a registered signal is raised.
///
/// Control signals are handled ahead of a pending raise, so a pause issued
/// before a write is always honoured. `destroy` runs exactly once, when the
/// waitable is removed, its signal is released or the scheduler shuts down.
pub struct TokioScheduler {
    runtime: Handle,
    waitables: Registry,
    stopped: AtomicBool,
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("waitables", &lock(&self.waitables).len())
            .field("stopped", &self.stopped.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl TokioScheduler {
    /// Create a scheduler spawning its tasks on `runtime`.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            waitables: Arc::new(Mutex::new(HashMap::new())),
            stopped: AtomicBool::new(false),
        }
    }

    /// Number of live waitables.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.waitables).len()
    }

    /// Whether no waitable is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every waitable and refuse new ones.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        let senders: Vec<_> = lock(&self.waitables).drain().collect();
        tracing::debug!("Stopping scheduler with {} waitables", senders.len());
        for (_, control) in senders {
            let _ = control.send(WaitableSignal::Remove);
        }
    }
}

impl Scheduler for TokioScheduler {
    fn insert_waitable(
        &self,
        signal: Arc<ReadinessSignal>,
        handler: Arc<dyn WaitableHandler>,
    ) -> Result<(), SchedulerError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(SchedulerError::Stopped);
        }

        let id = signal.id();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        {
            let mut waitables = lock(&self.waitables);
            if waitables.contains_key(&id) {
                return Err(SchedulerError::AlreadyRegistered(id));
            }
            waitables.insert(id, control_tx);
        }

        tracing::debug!("Registered waitable {id}");
        self.runtime.spawn(run_waitable(
            signal,
            handler,
            control_rx,
            Arc::clone(&self.waitables),
        ));
        Ok(())
    }

    fn signal_waitable(&self, id: WaitableId, signal: WaitableSignal) -> Result<(), SchedulerError> {
        let mut waitables = lock(&self.waitables);
        let control = if signal == WaitableSignal::Remove {
            waitables.remove(&id)
        } else {
            waitables.get(&id).cloned()
        }
        .ok_or(SchedulerError::UnknownWaitable(id))?;
        drop(waitables);

        control
            .send(signal)
            .map_err(|_| SchedulerError::UnknownWaitable(id))
    }
}

async fn run_waitable(
    signal: Arc<ReadinessSignal>,
    handler: Arc<dyn WaitableHandler>,
    mut control: mpsc::UnboundedReceiver<WaitableSignal>,
    registry: Registry,
) {
    let id = signal.id();
    let mut paused = false;

    loop {
        if paused {
            match control.recv().await {
                Some(WaitableSignal::Resume) => paused = false,
                Some(WaitableSignal::Pause) => {}
                Some(WaitableSignal::Remove) | None => break,
            }
            continue;
        }

        tokio::select! {
            biased;
            msg = control.recv() => match msg {
                Some(WaitableSignal::Pause) => paused = true,
                Some(WaitableSignal::Resume) => {}
                Some(WaitableSignal::Remove) | None => break,
            },
            raised = signal.wait() => {
                if !raised {
                    break;
                }
                if let Err(e) = handler.notify() {
                    tracing::warn!("Waitable {id} notify failed: {e}");
                }
            }
        }
    }

    lock(&registry).remove(&id);
    tracing::debug!("Waitable {id} finished");
    handler.destroy();
}

//! Lifecycle of the embedded runtime host.

use std::{
    borrow::Cow,
    fmt,
    ops::Deref,
    sync::{Mutex, MutexGuard, PoisonError},
};

use psh_bridge_core::{
    BackendError, BridgeConfig, CommandInvoker, HostState, InvocationError, Status, StatusCode,
};
use thiserror::Error;

use crate::{backend::RuntimeBackend, invoker};

/// Steps of the initialization chain, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    CreateFactory,
    ResolveRuntime,
    CheckLoadable,
    HostingService,
    StartService,
    DefaultDomain,
    AllocateImage,
    LoadImage,
    ResolveType,
}

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateFactory => "create factory",
            Self::ResolveRuntime => "resolve runtime",
            Self::CheckLoadable => "check loadable",
            Self::HostingService => "get hosting service",
            Self::StartService => "start hosting service",
            Self::DefaultDomain => "get default domain",
            Self::AllocateImage => "allocate image buffer",
            Self::LoadImage => "load image",
            Self::ResolveType => "resolve runner type",
        };
        f.write_str(name)
    }
}

/// Host error.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Failed to {step}: {source}")]
    Step {
        step: InitStep,
        #[source]
        source: BackendError,
    },
    #[error("Runtime {0} is not loadable")]
    NotLoadable(String),
    #[error("Failed to allocate {0} byte image buffer")]
    OutOfMemory(usize),
    #[error("Runtime host is {0}")]
    InvalidState(HostState),
}

impl HostError {
    /// Step of the chain that failed, if any.
    #[must_use]
    pub const fn step(&self) -> Option<InitStep> {
        match self {
            Self::Step { step, .. } => Some(*step),
            Self::NotLoadable(_) => Some(InitStep::CheckLoadable),
            Self::OutOfMemory(_) => Some(InitStep::AllocateImage),
            Self::InvalidState(_) => None,
        }
    }
}

impl StatusCode for HostError {
    fn status(&self) -> Status {
        match self {
            Self::Step { source, .. } => source.status(),
            Self::NotLoadable(_) => Status::CLR_E_SHIM_RUNTIME,
            Self::OutOfMemory(_) => Status::OUT_OF_MEMORY,
            Self::InvalidState(_) => Status::INVALID_STATE,
        }
    }
}

/// An acquired handle that logs its release.
struct Handle<T> {
    name: &'static str,
    inner: T,
}

impl<T> Handle<T> {
    fn acquire(
        name: &'static str,
        step: InitStep,
        result: Result<T, BackendError>,
    ) -> Result<Self, HostError> {
        let inner = result.map_err(|source| HostError::Step { step, source })?;
        tracing::trace!(handle = name, "Acquired");
        Ok(Self { name, inner })
    }
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        tracing::trace!(handle = self.name, "Released");
    }
}

/// Fully loaded runtime.
///
/// Fields drop in declaration order, which is the release order: dispatch
/// object first, factory last.
struct LoadedRuntime<B: RuntimeBackend> {
    dispatch: Handle<B::Dispatch>,
    _assembly: Handle<B::Assembly>,
    _domain: Handle<B::Domain>,
    _hosting: Handle<B::HostingService>,
    _runtime: Handle<B::RuntimeInfo>,
    _factory: Handle<B::Factory>,
}

enum Slot<B: RuntimeBackend> {
    Uninitialized,
    Initializing,
    Ready(LoadedRuntime<B>),
    Failed(Status),
    TornDown,
}

impl<B: RuntimeBackend> Slot<B> {
    const fn state(&self) -> HostState {
        match self {
            Self::Uninitialized => HostState::Uninitialized,
            Self::Initializing => HostState::Initializing,
            Self::Ready(_) => HostState::Ready,
            Self::Failed(_) => HostState::Failed,
            Self::TornDown => HostState::TornDown,
        }
    }
}

/// Owner of the single embedded runtime.
///
/// Initialization is driven by the caller; nothing here initializes
/// lazily. The internal lock is held for the duration of every invocation,
/// so invocations are serialized and never overlap teardown.
pub struct RuntimeHost<B: RuntimeBackend> {
    backend: B,
    config: BridgeConfig,
    image: Cow<'static, [u8]>,
    slot: Mutex<Slot<B>>,
}

impl<B: RuntimeBackend> fmt::Debug for RuntimeHost<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHost")
            .field("state", &self.state())
            .field("runtime_version", &self.config.runtime_version)
            .field("runner_type", &self.config.runner_type)
            .finish_non_exhaustive()
    }
}

impl<B: RuntimeBackend> RuntimeHost<B> {
    /// Create an uninitialized host that will load `image`.
    #[must_use]
    pub fn new(backend: B, config: BridgeConfig, image: impl Into<Cow<'static, [u8]>>) -> Self {
        Self {
            backend,
            config,
            image: image.into(),
            slot: Mutex::new(Slot::Uninitialized),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<B>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HostState {
        self.lock().state()
    }

    /// Status of the failed initialization, if it failed.
    #[must_use]
    pub fn failure(&self) -> Option<Status> {
        match &*self.lock() {
            Slot::Failed(status) => Some(*status),
            _ => None,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run the initialization chain.
    ///
    /// Only legal from `Uninitialized`. On failure every handle acquired so
    /// far is released in reverse order and the host is left `Failed`.
    ///
    /// # Errors
    /// Returns the failing step's error, or `InvalidState` if called twice.
    pub fn initialize(&self) -> Result<(), HostError> {
        {
            let mut slot = self.lock();
            if !matches!(*slot, Slot::Uninitialized) {
                return Err(HostError::InvalidState(slot.state()));
            }
            *slot = Slot::Initializing;
        }

        let outcome = self.load();

        let mut slot = self.lock();
        if matches!(*slot, Slot::TornDown) {
            tracing::warn!("Runtime host torn down during initialization");
            return Err(HostError::InvalidState(HostState::TornDown));
        }
        match outcome {
            Ok(runtime) => {
                *slot = Slot::Ready(runtime);
                tracing::info!(
                    version = %self.config.runtime_version,
                    runner = %self.config.runner_type,
                    "Runtime has been initialized"
                );
                Ok(())
            }
            Err(e) => {
                *slot = Slot::Failed(e.status());
                tracing::error!(step = ?e.step(), status = %e.status(), "Runtime initialization failed: {e}");
                Err(e)
            }
        }
    }

    fn load(&self) -> Result<LoadedRuntime<B>, HostError> {
        let backend = &self.backend;
        let version = self.config.runtime_version.as_str();

        tracing::debug!("Creating the runtime factory");
        let factory = Handle::acquire("factory", InitStep::CreateFactory, backend.create_factory())?;

        tracing::debug!(version, "Resolving the runtime");
        let runtime = Handle::acquire(
            "runtime info",
            InitStep::ResolveRuntime,
            backend.resolve_runtime(&factory, version),
        )?;

        tracing::debug!("Determining loadability");
        let loadable = backend
            .is_loadable(&runtime)
            .map_err(|source| HostError::Step {
                step: InitStep::CheckLoadable,
                source,
            })?;
        if !loadable {
            return Err(HostError::NotLoadable(version.to_owned()));
        }

        tracing::debug!("Instantiating the hosting service");
        let hosting = Handle::acquire(
            "hosting service",
            InitStep::HostingService,
            backend.hosting_service(&runtime),
        )?;

        tracing::debug!("Starting the hosting service");
        backend
            .start(&hosting)
            .map_err(|source| HostError::Step {
                step: InitStep::StartService,
                source,
            })?;

        tracing::debug!("Getting the default domain");
        let domain = Handle::acquire(
            "domain",
            InitStep::DefaultDomain,
            backend.default_domain(&hosting),
        )?;

        tracing::debug!(bytes = self.image.len(), "Loading the runner image");
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(self.image.len())
            .map_err(|_| HostError::OutOfMemory(self.image.len()))?;
        buffer.extend_from_slice(&self.image);
        let assembly = Handle::acquire(
            "assembly",
            InitStep::LoadImage,
            backend.load_image(&domain, &buffer),
        )?;
        drop(buffer);

        tracing::debug!(runner = %self.config.runner_type, "Resolving the runner type");
        let dispatch = Handle::acquire(
            "dispatch",
            InitStep::ResolveType,
            backend.resolve_type(&assembly, &self.config.runner_type),
        )?;

        Ok(LoadedRuntime {
            dispatch,
            _assembly: assembly,
            _domain: domain,
            _hosting: hosting,
            _runtime: runtime,
            _factory: factory,
        })
    }

    /// Release every handle and move to `TornDown`.
    ///
    /// Safe to call in any state and more than once.
    pub fn teardown(&self) {
        let previous = std::mem::replace(&mut *self.lock(), Slot::TornDown);
        match previous {
            Slot::Ready(runtime) => {
                tracing::debug!("Cleaning up the runtime");
                drop(runtime);
            }
            Slot::TornDown => {}
            other => tracing::debug!(state = %other.state(), "Teardown without a loaded runtime"),
        }
    }

    /// Run one command through the dispatch object.
    ///
    /// Does not initialize the host.
    ///
    /// # Errors
    /// Returns `NotReady` unless the host is `Ready`, or the invocation error.
    pub fn execute(&self, command: &str) -> Result<String, InvocationError> {
        let slot = self.lock();
        let Slot::Ready(runtime) = &*slot else {
            return Err(InvocationError::NotReady(slot.state()));
        };
        invoker::invoke(
            &self.backend,
            &runtime.dispatch,
            &self.config.invoke_method,
            command,
        )
    }
}

impl<B: RuntimeBackend> CommandInvoker for RuntimeHost<B> {
    fn invoke(&self, command: &str) -> Result<String, InvocationError> {
        self.execute(command)
    }
}

impl<B: RuntimeBackend> Drop for RuntimeHost<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

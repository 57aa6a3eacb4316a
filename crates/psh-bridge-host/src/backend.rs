//! Runtime backend abstraction.
//!
//! A backend exposes each step of the hosting chain as a separate call
//! returning an owned handle. Dropping a handle releases it, so the host can
//! unwind a partial chain by dropping what it holds.

use psh_bridge_core::{BackendError, Variant};

/// Steps needed to host a runtime and call into it.
pub trait RuntimeBackend: Send + Sync {
    /// Enumerates installed runtime versions.
    type Factory: Send + Sync;
    /// One resolved runtime version.
    type RuntimeInfo: Send + Sync;
    /// The service that runs the runtime.
    type HostingService: Send + Sync;
    /// Execution domain code is loaded into.
    type Domain: Send + Sync;
    /// A loaded module image.
    type Assembly: Send + Sync;
    /// Entry point all invocations go through.
    type Dispatch: Send + Sync;

    /// Acquire the runtime factory.
    ///
    /// # Errors
    /// Returns error if no factory is available.
    fn create_factory(&self) -> Result<Self::Factory, BackendError>;

    /// Resolve a specific runtime version.
    ///
    /// # Errors
    /// Returns error if the version is not installed.
    fn resolve_runtime(
        &self,
        factory: &Self::Factory,
        version: &str,
    ) -> Result<Self::RuntimeInfo, BackendError>;

    /// Whether the runtime can be loaded into this process.
    ///
    /// # Errors
    /// Returns error if loadability cannot be determined.
    fn is_loadable(&self, runtime: &Self::RuntimeInfo) -> Result<bool, BackendError>;

    /// Obtain the hosting service for a runtime.
    ///
    /// # Errors
    /// Returns error if the service cannot be instantiated.
    fn hosting_service(
        &self,
        runtime: &Self::RuntimeInfo,
    ) -> Result<Self::HostingService, BackendError>;

    /// Start the hosting service.
    ///
    /// # Errors
    /// Returns error if the service fails to start.
    fn start(&self, service: &Self::HostingService) -> Result<(), BackendError>;

    /// Get the default execution domain of a started service.
    ///
    /// # Errors
    /// Returns error if the service is not started.
    fn default_domain(&self, service: &Self::HostingService)
    -> Result<Self::Domain, BackendError>;

    /// Load an in-memory image into a domain.
    ///
    /// # Errors
    /// Returns error if the image is malformed.
    fn load_image(&self, domain: &Self::Domain, image: &[u8])
    -> Result<Self::Assembly, BackendError>;

    /// Resolve a type by name as the dispatch object.
    ///
    /// # Errors
    /// Returns error if the type does not exist in the assembly.
    fn resolve_type(
        &self,
        assembly: &Self::Assembly,
        type_name: &str,
    ) -> Result<Self::Dispatch, BackendError>;

    /// Call a public static method on the dispatch object.
    ///
    /// # Errors
    /// Returns error if the method is missing or the call throws.
    fn invoke_static(
        &self,
        dispatch: &Self::Dispatch,
        method: &str,
        args: &[Variant],
    ) -> Result<Variant, BackendError>;
}

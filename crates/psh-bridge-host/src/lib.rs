//! Embedded scripting runtime host.
//!
//! Provides:
//! - `RuntimeHost` - Lifecycle of the single embedded runtime
//! - `RuntimeBackend` - The hosting chain a runtime must expose
//! - `invoker` - One command in, one string out
//! - `RhaiBackend` - `rhai` engine backend (feature: rhai)

pub mod backend;
#[cfg(feature = "rhai")]
pub mod engine;
pub mod host;
pub mod image;
pub mod invoker;

pub use backend::RuntimeBackend;
#[cfg(feature = "rhai")]
pub use engine::RhaiBackend;
pub use host::{HostError, InitStep, RuntimeHost};
#[cfg(feature = "rhai")]
pub use image::RUNNER_IMAGE;

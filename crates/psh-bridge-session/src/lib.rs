//! Interactive shell sessions for the bridge.
//!
//! Provides:
//! - `InteractiveShell` - Channel ops running one command per write
//! - `ShellWaitable` - Scheduler callbacks that flush pending output

pub mod adapter;
pub mod shell;

pub use adapter::ShellWaitable;
pub use shell::{InteractiveShell, ShellMode};

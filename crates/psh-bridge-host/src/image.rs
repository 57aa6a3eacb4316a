//! Runner image compiled into the binary.

/// Runner script loaded into the engine each time the host initializes.
#[cfg(feature = "rhai")]
pub const RUNNER_IMAGE: &[u8] = include_bytes!("../runner/PowerShellRunner.rhai");

//! Bridge configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "PSH_BRIDGE_CONFIG";

/// Runtime version requested from the runtime factory.
pub const DEFAULT_RUNTIME_VERSION: &str = "v1";
/// Well-known runner type resolved in the loaded image.
pub const DEFAULT_RUNNER_TYPE: &str = "PowerShellRunner.PowerShellRunner";
/// Static method invoked with each command.
pub const DEFAULT_INVOKE_METHOD: &str = "InvokePS";
/// Prompt marker appended after every interactive result.
pub const DEFAULT_PROMPT: &str = "PS > ";
/// Type tag given to interactive channels.
pub const DEFAULT_CHANNEL_TYPE: &str = "psh";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings shared by the host, sessions and transport.
///
/// Every field has a default, so a partial JSON document is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Runtime version to resolve.
    pub runtime_version: String,
    /// Runner type name inside the image.
    pub runner_type: String,
    /// Method invoked on the runner type.
    pub invoke_method: String,
    /// Interactive prompt marker.
    pub prompt: String,
    /// Type tag for interactive channels.
    pub channel_type: String,
    /// Per-invocation operation budget for the runtime, `0` for unlimited.
    pub max_operations: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            runtime_version: DEFAULT_RUNTIME_VERSION.to_owned(),
            runner_type: DEFAULT_RUNNER_TYPE.to_owned(),
            invoke_method: DEFAULT_INVOKE_METHOD.to_owned(),
            prompt: DEFAULT_PROMPT.to_owned(),
            channel_type: DEFAULT_CHANNEL_TYPE.to_owned(),
            max_operations: 0,
        }
    }
}

impl BridgeConfig {
    /// Load from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Load from the file named by `PSH_BRIDGE_CONFIG`, or use defaults.
    ///
    /// # Errors
    /// Returns error if the variable is set but the file is unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                tracing::debug!(path = ?path, "Loading bridge config");
                Self::from_json_file(path)
            }
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: BridgeConfig = serde_json::from_str(r#"{"prompt": "> "}"#).unwrap();
        assert_eq!(config.prompt, "> ");
        assert_eq!(config.invoke_method, DEFAULT_INVOKE_METHOD);
        assert_eq!(config.runner_type, DEFAULT_RUNNER_TYPE);
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("psh-bridge-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"max_operations": 5000, "channel_type": "rhai"}"#).unwrap();
        let config = BridgeConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.max_operations, 5000);
        assert_eq!(config.channel_type, "rhai");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = BridgeConfig::from_json_file("/nonexistent/psh-bridge.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_malformed_file_is_json_error() {
        let path = std::env::temp_dir().join(format!("psh-bridge-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{ prompt: ").unwrap();
        let outcome = BridgeConfig::from_json_file(&path);
        std::fs::remove_file(&path).unwrap();
        let err = tokio_test::assert_err!(outcome);
        assert!(matches!(err, ConfigError::Json(_)));
    }
}

//! Values exchanged with the embedded runtime for one command.

use serde::{Deserialize, Serialize};

use crate::{InvocationError, Status, StatusCode};

/// Value crossing the host/runtime boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Variant {
    Empty,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Variant {
    /// Name of the variant kind, for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
        }
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// One command/result exchange.
///
/// Lives only for the duration of a single invocation. The result is set
/// only when the status is success.
#[derive(Debug, Clone)]
pub struct Invocation {
    command: String,
    result: Option<String>,
    status: Option<Status>,
}

impl Invocation {
    /// Start an invocation of `command`.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            result: None,
            status: None,
        }
    }

    /// The command text.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Build the single-element argument vector for the dispatch call.
    ///
    /// # Errors
    /// Returns error if the command contains an interior NUL.
    pub fn arguments(&self) -> Result<Vec<Variant>, InvocationError> {
        if let Some(pos) = self.command.find('\0') {
            return Err(InvocationError::Marshal(format!(
                "interior NUL at byte {pos}"
            )));
        }
        Ok(vec![Variant::from(self.command.as_str())])
    }

    /// Record the outcome and hand back the result.
    ///
    /// # Errors
    /// Returns the invocation error unchanged.
    pub fn complete(
        &mut self,
        outcome: Result<String, InvocationError>,
    ) -> Result<String, InvocationError> {
        self.status = Some(outcome.status());
        match outcome {
            Ok(result) => {
                self.result = Some(result.clone());
                Ok(result)
            }
            Err(e) => Err(e),
        }
    }

    /// Result text, present only after a successful completion.
    #[must_use]
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Completion status, if completed.
    #[must_use]
    pub const fn status(&self) -> Option<Status> {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_hold_single_string() {
        let invocation = Invocation::new("Get-Date");
        assert_eq!(
            invocation.arguments().unwrap(),
            vec![Variant::Str("Get-Date".into())]
        );
    }

    #[test]
    fn test_empty_command_is_allowed() {
        let invocation = Invocation::new("");
        assert_eq!(invocation.arguments().unwrap().len(), 1);
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        let invocation = Invocation::new("a\0b");
        let err = invocation.arguments().unwrap_err();
        assert_eq!(err.status(), Status::E_INVALIDARG);
    }

    #[test]
    fn test_result_only_on_success() {
        let mut ok = Invocation::new("x");
        assert_eq!(ok.complete(Ok("1".into())).unwrap(), "1");
        assert_eq!(ok.result(), Some("1"));
        assert_eq!(ok.status(), Some(Status::SUCCESS));

        let mut failed = Invocation::new("x");
        assert!(failed
            .complete(Err(InvocationError::UnexpectedReturn("int")))
            .is_err());
        assert_eq!(failed.result(), None);
        assert_eq!(failed.status(), Some(Status::DISP_E_TYPEMISMATCH));
    }
}

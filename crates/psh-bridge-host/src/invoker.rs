//! Marshals one command into the dispatch object.

use psh_bridge_core::{Invocation, InvocationError, Variant};

use crate::backend::RuntimeBackend;

/// Invoke `method` on `dispatch` with `command` as its only argument.
///
/// Returns the method's string result. On failure no result is produced.
///
/// # Errors
/// Returns error if the argument vector cannot be built, the call fails, or
/// the method returns something other than a string.
pub fn invoke<B: RuntimeBackend>(
    backend: &B,
    dispatch: &B::Dispatch,
    method: &str,
    command: &str,
) -> Result<String, InvocationError> {
    let mut invocation = Invocation::new(command);
    let outcome = call(backend, dispatch, method, &invocation);
    if let Err(e) = &outcome {
        tracing::debug!(method, error = %e, "Invocation failed");
    }
    invocation.complete(outcome)
}

fn call<B: RuntimeBackend>(
    backend: &B,
    dispatch: &B::Dispatch,
    method: &str,
    invocation: &Invocation,
) -> Result<String, InvocationError> {
    let args = invocation.arguments()?;
    tracing::trace!(method, command = invocation.command(), "Invoking");
    match backend.invoke_static(dispatch, method, &args)? {
        Variant::Str(result) => Ok(result),
        Variant::Empty => Ok(String::new()),
        other => Err(InvocationError::UnexpectedReturn(other.kind())),
    }
}

#[cfg(test)]
mod tests {
    use psh_bridge_core::{BackendError, Status, StatusCode};

    use super::*;

    /// Backend whose dispatch object is a closure over the argument vector.
    struct EchoBackend;

    type Reply = fn(&[Variant]) -> Result<Variant, BackendError>;

    impl RuntimeBackend for EchoBackend {
        type Factory = ();
        type RuntimeInfo = ();
        type HostingService = ();
        type Domain = ();
        type Assembly = ();
        type Dispatch = Reply;

        fn create_factory(&self) -> Result<(), BackendError> {
            Ok(())
        }
        fn resolve_runtime(&self, _: &(), _: &str) -> Result<(), BackendError> {
            Ok(())
        }
        fn is_loadable(&self, _: &()) -> Result<bool, BackendError> {
            Ok(true)
        }
        fn hosting_service(&self, _: &()) -> Result<(), BackendError> {
            Ok(())
        }
        fn start(&self, _: &()) -> Result<(), BackendError> {
            Ok(())
        }
        fn default_domain(&self, _: &()) -> Result<(), BackendError> {
            Ok(())
        }
        fn load_image(&self, _: &(), _: &[u8]) -> Result<(), BackendError> {
            Ok(())
        }
        fn resolve_type(&self, _: &(), _: &str) -> Result<Reply, BackendError> {
            Err(BackendError::new(Status::COR_E_TYPELOAD, "unused"))
        }
        fn invoke_static(
            &self,
            dispatch: &Reply,
            method: &str,
            args: &[Variant],
        ) -> Result<Variant, BackendError> {
            assert_eq!(method, "InvokePS");
            dispatch(args)
        }
    }

    #[test]
    fn test_single_string_argument_and_string_result() {
        let reply: Reply = |args| {
            assert_eq!(args.len(), 1);
            match &args[0] {
                Variant::Str(s) => Ok(Variant::Str(s.to_uppercase())),
                other => panic!("unexpected argument {other:?}"),
            }
        };
        let result = invoke(&EchoBackend, &reply, "InvokePS", "get-date").unwrap();
        assert_eq!(result, "GET-DATE");
    }

    #[test]
    fn test_empty_return_is_empty_string() {
        let reply: Reply = |_| Ok(Variant::Empty);
        assert_eq!(invoke(&EchoBackend, &reply, "InvokePS", "").unwrap(), "");
    }

    #[test]
    fn test_dispatch_failure_keeps_code() {
        let reply: Reply = |_| Err(BackendError::new(Status::DISP_E_EXCEPTION, "thrown"));
        let err = invoke(&EchoBackend, &reply, "InvokePS", "throw").unwrap_err();
        assert_eq!(err.status(), Status::DISP_E_EXCEPTION);
    }

    #[test]
    fn test_non_string_return_is_type_mismatch() {
        let reply: Reply = |_| Ok(Variant::Int(2));
        let err = invoke(&EchoBackend, &reply, "InvokePS", "1+1").unwrap_err();
        assert_eq!(err.status(), Status::DISP_E_TYPEMISMATCH);
    }

    #[test]
    fn test_marshal_failure_skips_dispatch() {
        let reply: Reply = |_| panic!("must not be called");
        let err = invoke(&EchoBackend, &reply, "InvokePS", "a\0b").unwrap_err();
        assert!(matches!(err, InvocationError::Marshal(_)));
    }
}

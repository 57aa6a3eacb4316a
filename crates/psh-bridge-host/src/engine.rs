//! `rhai` scripting engine backend.
//!
//! The factory knows the runtime versions this build supports, the hosting
//! service owns the engine, the image is runner script source compiled into
//! an AST, and the runner type is identified by the `TYPE_NAME` constant the
//! script exports.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use psh_bridge_core::{BackendError, BridgeConfig, Status, Variant, config::DEFAULT_RUNTIME_VERSION};
use rhai::{AST, CallFnOptions, Dynamic, Engine, FnAccess, ImmutableString, Scope};

use crate::backend::RuntimeBackend;

/// Runtime versions this build can host.
pub const INSTALLED_RUNTIMES: &[&str] = &[DEFAULT_RUNTIME_VERSION];

/// Constant a runner image exports to name its type.
pub const TYPE_NAME_EXPORT: &str = "TYPE_NAME";

/// Text printed by scripts during the current invocation.
type PrintBuffer = Arc<Mutex<String>>;

fn take_printed(buffer: &PrintBuffer) -> String {
    std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner))
}

/// Backend hosting the `rhai` engine.
#[derive(Debug, Clone, Default)]
pub struct RhaiBackend {
    max_operations: u64,
}

impl RhaiBackend {
    /// Backend with no operation limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend using the configured operation limit.
    #[must_use]
    pub const fn from_config(config: &BridgeConfig) -> Self {
        Self {
            max_operations: config.max_operations,
        }
    }

    fn build_engine(&self, printed: &PrintBuffer) -> Engine {
        let mut engine = Engine::new();
        if self.max_operations > 0 {
            engine.set_max_operations(self.max_operations);
        }

        let sink = Arc::clone(printed);
        engine.on_print(move |text| {
            let mut out = sink.lock().unwrap_or_else(PoisonError::into_inner);
            out.push_str(text);
            out.push('\n');
        });
        engine.on_debug(|text, source, pos| {
            tracing::debug!(?source, ?pos, "script: {text}");
        });
        engine
    }
}

/// Runtime factory.
#[derive(Debug)]
pub struct RhaiFactory {
    installed: Vec<String>,
}

/// A resolved runtime version.
#[derive(Debug)]
pub struct RhaiRuntime {
    version: String,
}

impl RhaiRuntime {
    /// Resolved version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Owns the engine once started.
pub struct RhaiHostingService {
    engine: OnceLock<Arc<Engine>>,
    printed: PrintBuffer,
}

/// Default execution domain.
pub struct RhaiDomain {
    engine: Arc<Engine>,
    printed: PrintBuffer,
}

/// A compiled runner image.
pub struct RhaiAssembly {
    engine: Arc<Engine>,
    printed: PrintBuffer,
    ast: Arc<AST>,
    type_name: Option<String>,
}

/// The resolved runner type.
pub struct RhaiDispatch {
    engine: Arc<Engine>,
    printed: PrintBuffer,
    ast: Arc<AST>,
    type_name: String,
}

impl RhaiDispatch {
    /// Name of the resolved type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    fn has_public_method(&self, method: &str, arity: usize) -> bool {
        self.ast.iter_functions().any(|f| {
            f.name == method && matches!(f.access, FnAccess::Public) && f.params.len() == arity
        })
    }
}

fn to_dynamic(value: &Variant) -> Dynamic {
    match value {
        Variant::Empty => Dynamic::UNIT,
        Variant::Bool(b) => Dynamic::from(*b),
        Variant::Int(i) => Dynamic::from(*i),
        Variant::Str(s) => Dynamic::from(s.clone()),
    }
}

fn to_variant(value: Dynamic) -> Variant {
    if value.is_unit() {
        return Variant::Empty;
    }
    if let Ok(b) = value.as_bool() {
        return Variant::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return Variant::Int(i);
    }
    if value.is_string() {
        return Variant::Str(value.into_string().unwrap_or_default());
    }
    Variant::Str(value.to_string())
}

impl RuntimeBackend for RhaiBackend {
    type Factory = RhaiFactory;
    type RuntimeInfo = RhaiRuntime;
    type HostingService = RhaiHostingService;
    type Domain = RhaiDomain;
    type Assembly = RhaiAssembly;
    type Dispatch = RhaiDispatch;

    fn create_factory(&self) -> Result<RhaiFactory, BackendError> {
        Ok(RhaiFactory {
            installed: INSTALLED_RUNTIMES.iter().map(|v| (*v).to_owned()).collect(),
        })
    }

    fn resolve_runtime(
        &self,
        factory: &RhaiFactory,
        version: &str,
    ) -> Result<RhaiRuntime, BackendError> {
        if factory.installed.iter().any(|v| v == version) {
            Ok(RhaiRuntime {
                version: version.to_owned(),
            })
        } else {
            Err(BackendError::new(
                Status::CLR_E_SHIM_RUNTIME,
                format!(
                    "runtime {version} is not installed (have {})",
                    factory.installed.join(", ")
                ),
            ))
        }
    }

    fn is_loadable(&self, _runtime: &RhaiRuntime) -> Result<bool, BackendError> {
        Ok(true)
    }

    fn hosting_service(&self, _runtime: &RhaiRuntime) -> Result<RhaiHostingService, BackendError> {
        Ok(RhaiHostingService {
            engine: OnceLock::new(),
            printed: PrintBuffer::default(),
        })
    }

    fn start(&self, service: &RhaiHostingService) -> Result<(), BackendError> {
        service
            .engine
            .set(Arc::new(self.build_engine(&service.printed)))
            .map_err(|_| BackendError::new(Status::E_FAIL, "hosting service already started"))
    }

    fn default_domain(&self, service: &RhaiHostingService) -> Result<RhaiDomain, BackendError> {
        let engine = service
            .engine
            .get()
            .ok_or_else(|| BackendError::new(Status::E_FAIL, "hosting service not started"))?;
        Ok(RhaiDomain {
            engine: Arc::clone(engine),
            printed: Arc::clone(&service.printed),
        })
    }

    fn load_image(&self, domain: &RhaiDomain, image: &[u8]) -> Result<RhaiAssembly, BackendError> {
        let source = std::str::from_utf8(image).map_err(|e| {
            BackendError::new(Status::COR_E_BADIMAGEFORMAT, format!("image is not UTF-8: {e}"))
        })?;
        let ast = domain
            .engine
            .compile(source)
            .map_err(|e| BackendError::new(Status::COR_E_BADIMAGEFORMAT, e.to_string()))?;

        let mut scope = Scope::new();
        domain
            .engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| BackendError::new(Status::COR_E_BADIMAGEFORMAT, e.to_string()))?;
        let type_name = scope
            .get_value::<ImmutableString>(TYPE_NAME_EXPORT)
            .map(|name| name.to_string());

        Ok(RhaiAssembly {
            engine: Arc::clone(&domain.engine),
            printed: Arc::clone(&domain.printed),
            ast: Arc::new(ast),
            type_name,
        })
    }

    fn resolve_type(
        &self,
        assembly: &RhaiAssembly,
        type_name: &str,
    ) -> Result<RhaiDispatch, BackendError> {
        if assembly.type_name.as_deref() != Some(type_name) {
            return Err(BackendError::new(
                Status::COR_E_TYPELOAD,
                format!("type {type_name} not found in image"),
            ));
        }
        Ok(RhaiDispatch {
            engine: Arc::clone(&assembly.engine),
            printed: Arc::clone(&assembly.printed),
            ast: Arc::clone(&assembly.ast),
            type_name: type_name.to_owned(),
        })
    }

    fn invoke_static(
        &self,
        dispatch: &RhaiDispatch,
        method: &str,
        args: &[Variant],
    ) -> Result<Variant, BackendError> {
        if !dispatch.has_public_method(method, args.len()) {
            return Err(BackendError::new(
                Status::DISP_E_MEMBERNOTFOUND,
                format!("{}.{method}/{} not found", dispatch.type_name, args.len()),
            ));
        }

        let args: Vec<Dynamic> = args.iter().map(to_dynamic).collect();
        take_printed(&dispatch.printed);

        let mut scope = Scope::new();
        let options = CallFnOptions::new().eval_ast(false);
        let outcome = dispatch.engine.call_fn_with_options::<Dynamic>(
            options,
            &mut scope,
            &dispatch.ast,
            method,
            args,
        );
        let printed = take_printed(&dispatch.printed);
        let value = outcome.map_err(|e| BackendError::new(Status::DISP_E_EXCEPTION, e.to_string()))?;

        Ok(match to_variant(value) {
            Variant::Str(s) => Variant::Str(printed + s.as_str()),
            Variant::Empty if !printed.is_empty() => Variant::Str(printed),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use psh_bridge_core::{HostState, InvocationError, StatusCode};

    use super::*;
    use crate::{HostError, InitStep, RUNNER_IMAGE, RuntimeHost};

    fn ready_host() -> RuntimeHost<RhaiBackend> {
        let host = RuntimeHost::new(RhaiBackend::new(), BridgeConfig::default(), RUNNER_IMAGE);
        host.initialize().unwrap();
        host
    }

    #[test]
    fn test_arithmetic() {
        let host = ready_host();
        assert_eq!(host.execute("1+1").unwrap(), "2");
    }

    #[test]
    fn test_unit_result_is_empty() {
        let host = ready_host();
        assert_eq!(host.execute("let x = 5;").unwrap(), "");
        assert_eq!(host.execute("").unwrap(), "");
    }

    #[test]
    fn test_print_output_precedes_value() {
        let host = ready_host();
        assert_eq!(host.execute(r#"print("hello"); 40 + 2"#).unwrap(), "hello\n42");
        assert_eq!(host.execute(r#"print("only")"#).unwrap(), "only\n");
    }

    #[test]
    fn test_arrays_render_one_item_per_line() {
        let host = ready_host();
        assert_eq!(host.execute("[1, \"two\", 3]").unwrap(), "1\ntwo\n3\n");
    }

    #[test]
    fn test_script_error_is_dispatch_exception() {
        let host = ready_host();
        let err = host.execute("undefined_variable + 1").unwrap_err();
        assert!(matches!(err, InvocationError::Dispatch(_)));
        assert_eq!(err.status(), Status::DISP_E_EXCEPTION);
        // The host stays usable after a failed command.
        assert_eq!(host.execute("3 * 3").unwrap(), "9");
    }

    #[test]
    fn test_unknown_runtime_version() {
        let config = BridgeConfig {
            runtime_version: "v2.0.50727".into(),
            ..BridgeConfig::default()
        };
        let host = RuntimeHost::new(RhaiBackend::new(), config, RUNNER_IMAGE);
        let err = host.initialize().unwrap_err();
        assert_eq!(err.step(), Some(InitStep::ResolveRuntime));
        assert_eq!(err.status(), Status::CLR_E_SHIM_RUNTIME);
        assert_eq!(host.state(), HostState::Failed);
    }

    #[test]
    fn test_malformed_image() {
        let host = RuntimeHost::new(RhaiBackend::new(), BridgeConfig::default(), &b"fn ("[..]);
        let err = host.initialize().unwrap_err();
        assert!(matches!(
            err,
            HostError::Step {
                step: InitStep::LoadImage,
                ..
            }
        ));
        assert_eq!(err.status(), Status::COR_E_BADIMAGEFORMAT);
    }

    #[test]
    fn test_unknown_runner_type() {
        let config = BridgeConfig {
            runner_type: "Other.Runner".into(),
            ..BridgeConfig::default()
        };
        let host = RuntimeHost::new(RhaiBackend::new(), config, RUNNER_IMAGE);
        let err = host.initialize().unwrap_err();
        assert_eq!(err.step(), Some(InitStep::ResolveType));
        assert_eq!(err.status(), Status::COR_E_TYPELOAD);
    }

    #[test]
    fn test_private_method_is_not_bound() {
        let config = BridgeConfig {
            invoke_method: "render".into(),
            ..BridgeConfig::default()
        };
        let host = RuntimeHost::new(RhaiBackend::new(), config, RUNNER_IMAGE);
        host.initialize().unwrap();
        let err = host.execute("1").unwrap_err();
        assert_eq!(err.status(), Status::DISP_E_MEMBERNOTFOUND);
    }

    #[test]
    fn test_operation_limit() {
        let config = BridgeConfig {
            max_operations: 1_000,
            ..BridgeConfig::default()
        };
        let host = RuntimeHost::new(RhaiBackend::from_config(&config), config, RUNNER_IMAGE);
        host.initialize().unwrap();
        let err = host.execute("loop {}").unwrap_err();
        assert_eq!(err.status(), Status::DISP_E_EXCEPTION);
    }
}

//! Isolated V8 sandbox.
//!
//! One [`Sandbox`] owns one `JsRuntime`, which is one isolate with one
//! main context. Every operation is synchronous from the host's view and
//! takes an exclusive borrow of the runtime for its duration.

use crate::error::{SandboxError, SandboxResult};
use crate::host::{write_callback, HostWriter, WriterSlot};
use crate::reference::{Reference, Transfer};
use cloister_core::SandboxId;
use deno_core::{v8, JsRuntime, RuntimeOptions};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

/// Default heap ceiling (64MB)
pub const DEFAULT_MAX_HEAP: usize = 64 * 1024 * 1024;

/// Removes the engine's host globals and silences its console.
///
/// Leftover console methods become no-ops so nothing reaches the engine's
/// print op.
const HARDEN_SOURCE: &str = r#"'use strict';
delete globalThis.Deno;
delete globalThis.__bootstrap;
delete globalThis.__infra;
const quiet = {};
for (const key of Object.keys(globalThis.console ?? {})) {
  quiet[key] = function () {};
}
globalThis.console = quiet;
"#;

/// Sandbox configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Initial heap size in bytes
    pub initial_heap_size: usize,
    /// Maximum heap size in bytes
    pub max_heap_size: usize,
    /// Remove the engine's own host namespace from the global object
    pub harden: bool,
}

impl SandboxConfig {
    /// Create a new sandbox config
    #[must_use]
    pub fn new() -> Self {
        Self {
            initial_heap_size: 0,
            max_heap_size: DEFAULT_MAX_HEAP,
            harden: true,
        }
    }

    /// Set initial heap size
    #[must_use]
    pub fn with_initial_heap_size(mut self, bytes: usize) -> Self {
        self.initial_heap_size = bytes;
        self
    }

    /// Set maximum heap size
    #[must_use]
    pub fn with_max_heap_size(mut self, bytes: usize) -> Self {
        self.max_heap_size = bytes;
        self
    }

    /// Enable/disable hardening
    #[must_use]
    pub fn with_harden(mut self, harden: bool) -> Self {
        self.harden = harden;
        self
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// An isolated heap and global object
pub struct Sandbox {
    id: SandboxId,
    config: SandboxConfig,
    runtime: RefCell<JsRuntime>,
    heap_exhausted: Rc<Cell<bool>>,
}

impl Sandbox {
    /// Create a sandbox
    ///
    /// # Errors
    ///
    /// Returns error if hardening the global object fails.
    pub fn new(config: SandboxConfig) -> SandboxResult<Self> {
        let create_params =
            v8::CreateParams::default().heap_limits(config.initial_heap_size, config.max_heap_size);
        let mut runtime = JsRuntime::new(RuntimeOptions {
            create_params: Some(create_params),
            ..Default::default()
        });

        let heap_exhausted = Rc::new(Cell::new(false));
        let handle = runtime.v8_isolate().thread_safe_handle();
        let flag = heap_exhausted.clone();
        runtime.add_near_heap_limit_callback(move |current, _initial| {
            flag.set(true);
            handle.terminate_execution();
            // Headroom for the termination to unwind
            current.saturating_mul(2)
        });

        let sandbox = Self {
            id: SandboxId::new(),
            config,
            runtime: RefCell::new(runtime),
            heap_exhausted,
        };

        if sandbox.config.harden {
            sandbox.run_script("<harden>", HARDEN_SOURCE.to_string())?;
        }

        debug!(
            sandbox = %sandbox.id,
            max_heap = sandbox.config.max_heap_size,
            harden = sandbox.config.harden,
            "sandbox created"
        );
        Ok(sandbox)
    }

    /// Create a sandbox with default configuration
    ///
    /// # Errors
    ///
    /// Returns error if creation fails.
    pub fn default_config() -> SandboxResult<Self> {
        Self::new(SandboxConfig::default())
    }

    /// Sandbox identifier
    #[must_use]
    pub fn id(&self) -> SandboxId {
        self.id
    }

    /// Sandbox configuration
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `f` inside a handle scope of this sandbox's context
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Busy`] when called while another step on this
    /// sandbox is running, otherwise whatever `f` returns.
    pub fn with_scope<R>(
        &self,
        f: impl FnOnce(&mut v8::HandleScope<'_>) -> SandboxResult<R>,
    ) -> SandboxResult<R> {
        let mut runtime = self.runtime.try_borrow_mut().map_err(|_| SandboxError::Busy)?;
        let result = {
            let scope = &mut runtime.handle_scope();
            f(scope)
        };
        self.settle(&mut runtime, result)
    }

    /// Wrap a value handle created inside [`Sandbox::with_scope`]
    #[must_use]
    pub fn adopt(&self, value: v8::Global<v8::Value>) -> Reference<'_> {
        Reference::new(self, value)
    }

    /// Compile and run a script, returning a reference to its completion value
    ///
    /// The compiled script itself is not retained.
    ///
    /// # Errors
    ///
    /// Returns error if the script fails to compile or throws.
    pub fn execute(&self, name: &'static str, code: impl Into<String>) -> SandboxResult<Reference<'_>> {
        let value = self.run_script(name, code.into())?;
        Ok(self.adopt(value))
    }

    /// Compile and run a script, returning a structured copy of its completion value
    ///
    /// # Errors
    ///
    /// Returns error if the script fails or the value cannot be copied.
    pub fn execute_copy<T: DeserializeOwned>(
        &self,
        name: &'static str,
        code: impl Into<String>,
    ) -> SandboxResult<T> {
        self.execute(name, code)?.copy()
    }

    /// Compile a closure body taking `arity` positional parameters `$0..$n`
    ///
    /// # Errors
    ///
    /// Returns error if the body fails to compile.
    pub fn compile_closure(&self, body: &str, arity: usize) -> SandboxResult<Reference<'_>> {
        let params = (0..arity).map(|i| format!("${i}")).collect::<Vec<_>>().join(",");
        self.execute("<closure>", format!("(function({params}) {{\n{body}\n}})"))
    }

    /// Evaluate a closure body with explicitly bound arguments
    ///
    /// Argument `i` is visible to the body as `$i`.
    ///
    /// # Errors
    ///
    /// Returns error if the body fails to compile, an argument cannot be
    /// materialized, or the body throws.
    pub fn eval_closure(&self, body: &str, args: Vec<Transfer>) -> SandboxResult<Reference<'_>> {
        self.compile_closure(body, args.len())?.apply(args)
    }

    /// Reference to the sandbox's global object
    ///
    /// # Errors
    ///
    /// Returns error if the sandbox is busy.
    pub fn global(&self) -> SandboxResult<Reference<'_>> {
        let value = self.with_scope(|scope| {
            let global = scope.get_current_context().global(scope);
            let global: v8::Local<v8::Value> = global.into();
            Ok(v8::Global::new(scope, global))
        })?;
        Ok(self.adopt(value))
    }

    /// Bind a host writer and return the sandbox-side `(fd, text)` function
    ///
    /// The writer is stored per sandbox. Installing again replaces it for
    /// every previously returned write function as well.
    ///
    /// # Errors
    ///
    /// Returns error if the sandbox is busy or the function cannot be created.
    pub fn install_writer(&self, writer: Rc<dyn HostWriter>) -> SandboxResult<Reference<'_>> {
        {
            let mut runtime = self.runtime.try_borrow_mut().map_err(|_| SandboxError::Busy)?;
            runtime.v8_isolate().set_slot(WriterSlot::new(self.id, writer));
        }
        let value = self.with_scope(|scope| {
            let func = v8::Function::new(scope, write_callback).ok_or_else(|| {
                SandboxError::Native {
                    module: "write".to_string(),
                    reason: "could not create write function".to_string(),
                }
            })?;
            let func: v8::Local<v8::Value> = func.into();
            Ok(v8::Global::new(scope, func))
        })?;
        debug!(sandbox = %self.id, "host writer installed");
        Ok(self.adopt(value))
    }

    fn run_script(&self, name: &'static str, code: String) -> SandboxResult<v8::Global<v8::Value>> {
        let mut runtime = self.runtime.try_borrow_mut().map_err(|_| SandboxError::Busy)?;
        let result = runtime
            .execute_script(name, code)
            .map_err(|e| SandboxError::Compile {
                script: name.to_string(),
                message: e.to_string(),
            });
        self.settle(&mut runtime, result)
    }

    /// Turn a heap-limit termination into [`SandboxError::HeapLimit`] and
    /// make the isolate usable again
    fn settle<R>(&self, runtime: &mut JsRuntime, result: SandboxResult<R>) -> SandboxResult<R> {
        if !self.heap_exhausted.replace(false) {
            return result;
        }
        runtime.v8_isolate().cancel_terminate_execution();
        warn!(sandbox = %self.id, limit = self.config.max_heap_size, "heap limit reached");
        Err(SandboxError::HeapLimit {
            limit: self.config.max_heap_size,
        })
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Call `func` with an `undefined` receiver, catching any exception
pub(crate) fn call_function<'s>(
    scope: &mut v8::HandleScope<'s>,
    func: v8::Local<'s, v8::Function>,
    args: &[v8::Local<'s, v8::Value>],
) -> SandboxResult<v8::Local<'s, v8::Value>> {
    let tc = &mut v8::TryCatch::new(scope);
    let recv: v8::Local<v8::Value> = v8::undefined(tc).into();
    match func.call(tc, recv, args) {
        Some(value) => Ok(value),
        None => Err(caught(tc)),
    }
}

/// Render the pending exception as text
pub(crate) fn caught(tc: &mut v8::TryCatch<v8::HandleScope>) -> SandboxError {
    if tc.has_terminated() {
        return SandboxError::Terminated;
    }
    let stack = tc.stack_trace().filter(|s| s.is_string());
    let message = match stack.or_else(|| tc.exception()) {
        Some(value) => value.to_rust_string_lossy(tc),
        None => "unknown exception".to_string(),
    };
    SandboxError::Exception { message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_builder() {
        let config = SandboxConfig::new()
            .with_initial_heap_size(1024)
            .with_max_heap_size(32 * 1024 * 1024)
            .with_harden(false);
        assert_eq!(config.initial_heap_size, 1024);
        assert_eq!(config.max_heap_size, 32 * 1024 * 1024);
        assert!(!config.harden);
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: SandboxConfig = serde_json::from_str(r#"{"harden": false}"#).unwrap();
        assert_eq!(config.max_heap_size, DEFAULT_MAX_HEAP);
        assert!(!config.harden);
    }

    #[test]
    fn test_execute_copy() {
        let sandbox = Sandbox::default_config().unwrap();
        let value: i32 = sandbox.execute_copy("<test>", "1 + 2").unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn test_harden_removes_host_namespace() {
        let sandbox = Sandbox::default_config().unwrap();
        let kinds: Vec<String> = sandbox
            .execute_copy("<test>", "[typeof Deno, typeof __bootstrap, typeof __infra]")
            .unwrap();
        assert_eq!(kinds, ["undefined", "undefined", "undefined"]);

        let quiet: bool = sandbox
            .execute_copy(
                "<test>",
                "Object.values(console).every((f) => typeof f === 'function' && f() === undefined && !String(f).includes('op_'))",
            )
            .unwrap();
        assert!(quiet);

        let open = Sandbox::new(SandboxConfig::new().with_harden(false)).unwrap();
        let kind: String = open.execute_copy("<test>", "typeof Deno").unwrap();
        assert_eq!(kind, "object");
    }

    #[test]
    fn test_heap_limit_is_recoverable() {
        let sandbox = Sandbox::new(SandboxConfig::new().with_max_heap_size(16 * 1024 * 1024)).unwrap();
        let err = sandbox
            .execute(
                "<hog>",
                "(() => { const hog = []; while (true) { hog.push(new Array(100000).fill(1)); } })()",
            )
            .unwrap_err();
        assert_eq!(
            err,
            SandboxError::HeapLimit {
                limit: 16 * 1024 * 1024
            }
        );

        let value: i32 = sandbox.execute_copy("<after>", "1 + 1").unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn test_compile_error() {
        let sandbox = Sandbox::default_config().unwrap();
        let err = sandbox.execute("<bad>", "function (").unwrap_err();
        assert!(matches!(err, SandboxError::Compile { ref script, .. } if script == "<bad>"));
    }

    #[test]
    fn test_eval_closure_binds_arguments() {
        let sandbox = Sandbox::default_config().unwrap();
        let sum: i64 = sandbox
            .eval_closure(
                "return $0 + $1;",
                vec![Transfer::json(json!(2)), Transfer::json(json!(40))],
            )
            .unwrap()
            .copy()
            .unwrap();
        assert_eq!(sum, 42);
    }

    #[test]
    fn test_eval_closure_exception_is_text() {
        let sandbox = Sandbox::default_config().unwrap();
        let err = sandbox
            .eval_closure("throw new TypeError('boom');", vec![])
            .unwrap_err();
        match err {
            SandboxError::Exception { message } => {
                assert!(message.contains("TypeError"));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_thrown_primitive_is_text() {
        let sandbox = Sandbox::default_config().unwrap();
        let err = sandbox.eval_closure("throw 7;", vec![]).unwrap_err();
        assert_eq!(
            err,
            SandboxError::Exception {
                message: "7".to_string()
            }
        );
    }

    #[test]
    fn test_nested_step_is_busy() {
        let sandbox = Sandbox::default_config().unwrap();
        sandbox
            .with_scope(|_| {
                assert!(matches!(
                    sandbox.execute("<nested>", "1"),
                    Err(SandboxError::Busy)
                ));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_global_reference() {
        let sandbox = Sandbox::default_config().unwrap();
        let global = sandbox.global().unwrap();
        assert!(global.get("Object").unwrap().is_function().unwrap());
        assert!(global.get("nothingHere").unwrap().is_undefined().unwrap());
    }
}

//! Rhai sandbox implementation
//!
//! One [`ScriptSandbox`] exists per batch. It owns a dedicated engine whose
//! only channel to the outside world is the [`LogSink`] it was built with.

use super::console::{self, LogSink};
use super::hooks::{DestinationHooks, EventContext, HookFn, LoadedScript, TransformStep};
use super::{create_shared_cache, CompiledScript, SharedScriptCache};
use crate::config::DEFAULT_SCRIPT_CACHE_CAPACITY;
use crate::error::{describe_script_error, ProcessorError, Result};
use crate::types::{Destination, Transformation};
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, Scope};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// How many operations run between two wall-clock checks
const DEADLINE_CHECK_INTERVAL: u64 = 256;

/// Resource ceilings enforced on every script invocation
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxLimits {
    /// Maximum operations per invocation (0 = unlimited)
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    /// Maximum string length in bytes (0 = unlimited)
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
    /// Wall-clock budget per hook or step invocation
    pub execution_timeout: Option<Duration>,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 32,
            max_expr_depth: 64,
            max_string_size: 1024 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
            execution_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Wall-clock deadline of the invocation currently running, if any
#[derive(Debug, Clone, Default)]
struct Deadline(Arc<Mutex<Option<Instant>>>);

impl Deadline {
    fn arm(&self, timeout: Option<Duration>) -> DeadlineGuard<'_> {
        *self.lock() = timeout.map(|t| Instant::now() + t);
        DeadlineGuard(self)
    }

    fn expired(&self) -> bool {
        self.lock().is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Instant>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the deadline when the invocation returns
struct DeadlineGuard<'a>(&'a Deadline);

impl Drop for DeadlineGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// Isolated execution context for one batch
pub struct ScriptSandbox {
    engine: Engine,
    logs: LogSink,
    deadline: Deadline,
    limits: SandboxLimits,
    /// Compiled scripts shared with other sandboxes
    scripts: SharedScriptCache,
}

impl ScriptSandbox {
    /// Create a sandbox with a fresh engine and log sink
    pub fn new(limits: SandboxLimits, scripts: SharedScriptCache) -> Self {
        let logs = LogSink::new();
        let deadline = Deadline::default();
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine, &limits, &logs, &deadline);

        Self {
            engine,
            logs,
            deadline,
            limits,
            scripts,
        }
    }

    /// Configure the Rhai engine with the diagnostic functions and safety limits
    fn configure_engine(
        engine: &mut Engine,
        limits: &SandboxLimits,
        logs: &LogSink,
        deadline: &Deadline,
    ) {
        engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
        engine.set_max_call_levels(limits.max_call_levels);
        engine.set_max_operations(limits.max_operations);
        engine.set_max_string_size(limits.max_string_size);
        engine.set_max_array_size(limits.max_array_size);
        engine.set_max_map_size(limits.max_map_size);

        // No filesystem modules and no dynamic code
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");

        console::register(engine, logs);
        EventContext::register(engine);

        let deadline = deadline.clone();
        engine.on_progress(move |ops| {
            if ops % DEADLINE_CHECK_INTERVAL == 0 && deadline.expired() {
                Some(Dynamic::from("execution time limit exceeded"))
            } else {
                None
            }
        });
    }

    /// Diagnostic lines recorded by scripts running in this sandbox
    pub fn logs(&self) -> &LogSink {
        &self.logs
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Compile a script (using the shared cache)
    pub fn compile(&self, name: &str, source: &str) -> Result<CompiledScript> {
        let mut cache = self.scripts.lock().map_err(|e| {
            ProcessorError::SandboxConstruction(format!(
                "Failed to acquire script cache lock: {}",
                e
            ))
        })?;

        cache.get_or_compile(&self.engine, name, source)
    }

    /// Compile a script and run its top-level statements once
    pub fn load(&self, name: &str, source: &str) -> Result<LoadedScript> {
        let compiled = self.compile(name, source)?;

        {
            let _deadline = self.deadline.arm(self.limits.execution_timeout);
            self.engine
                .run_ast_with_scope(&mut Scope::new(), compiled.ast())
                .map_err(|e| {
                    ProcessorError::SandboxConstruction(format!(
                        "{}: {}",
                        name,
                        describe_script_error(&e)
                    ))
                })?;
        }

        tracing::trace!(script = name, "Loaded script into sandbox");
        Ok(LoadedScript::new(name.to_string(), compiled))
    }

    /// Load a transformation; its script must define `transform`
    pub fn load_transformation(&self, transformation: &Transformation) -> Result<TransformStep> {
        let script = self.load(
            &format!("transformation {}", transformation.id),
            &transformation.script,
        )?;
        TransformStep::from_script(&transformation.id, script)
    }

    /// Load a destination and detect which hooks it provides
    pub fn load_destination(&self, destination: &Destination) -> Result<DestinationHooks> {
        let config = self.to_script_value(&destination.config)?;
        let script = self.load(&format!("destination {}", destination.id), &destination.script)?;
        let hooks = DestinationHooks::from_script(&destination.id, script, config)?;

        tracing::debug!(
            destination_id = %destination.id,
            setup = hooks.has_setup(),
            execute = hooks.has_execute(),
            teardown = hooks.has_teardown(),
            "Loaded destination hooks"
        );
        Ok(hooks)
    }

    /// Convert a JSON value into a fresh script value
    pub fn to_script_value(&self, value: &serde_json::Value) -> Result<Dynamic> {
        rhai::serde::to_dynamic(value)
            .map_err(|e| ProcessorError::Serialization(describe_script_error(&e)))
    }

    /// Invoke one hook under the configured deadline
    pub(crate) fn call(
        &self,
        script: &LoadedScript,
        hook: &HookFn,
        args: Vec<Dynamic>,
    ) -> std::result::Result<Dynamic, Box<EvalAltResult>> {
        let _deadline = self.deadline.arm(self.limits.execution_timeout);
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);

        self.engine
            .call_fn_with_options(options, &mut Scope::new(), script.ast(), hook.name, args)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl Default for ScriptSandbox {
    fn default() -> Self {
        Self::new(
            SandboxLimits::default(),
            create_shared_cache(DEFAULT_SCRIPT_CACHE_CAPACITY),
        )
    }
}

impl std::fmt::Debug for ScriptSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptSandbox")
            .field("limits", &self.limits)
            .field("buffered_logs", &self.logs.len())
            .finish()
    }
}

//! Typed entry points of loaded scripts.
//!
//! Hooks are detected once, when a script is loaded, from the compiled
//! script's function table. A hook that is not defined is `None`; nothing is
//! looked up at call time.

use super::sandbox::ScriptSandbox;
use super::CompiledScript;
use crate::error::{describe_script_error, ProcessorError, Result};
use rhai::{Array, Dynamic, Engine, ImmutableString, Map, AST};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Scratch state shared by every step and the destination for one event.
///
/// Clones share state, so a value stored by one step is visible to the next
/// and to the destination. The processor creates a fresh context per event.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    state: Arc<Mutex<Map>>,
}

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Dynamic> {
        self.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Dynamic) {
        self.lock().insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().map(|k| k.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> Map {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Map> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn to_json(&self) -> String {
        serde_json::to_string(&Dynamic::from_map(self.snapshot())).unwrap_or_default()
    }

    /// Expose the context to scripts as type `Context`
    pub(crate) fn register(engine: &mut Engine) {
        engine
            .register_type_with_name::<EventContext>("Context")
            .register_indexer_get(|ctx: &mut EventContext, key: ImmutableString| -> Dynamic {
                ctx.get(&key).unwrap_or(Dynamic::UNIT)
            })
            .register_indexer_set(
                |ctx: &mut EventContext, key: ImmutableString, value: Dynamic| {
                    ctx.set(&key, value)
                },
            )
            .register_fn("contains", |ctx: &mut EventContext, key: ImmutableString| {
                ctx.contains(&key)
            })
            .register_fn("keys", |ctx: &mut EventContext| -> Array {
                ctx.keys().into_iter().map(Dynamic::from).collect()
            })
            .register_fn("len", |ctx: &mut EventContext| ctx.len() as i64)
            .register_fn("to_string", |ctx: &mut EventContext| ctx.to_json())
            .register_fn("to_debug", |ctx: &mut EventContext| ctx.to_json());
    }
}

/// A script function resolved as a hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookFn {
    pub name: &'static str,
    /// Number of parameters the script declared
    pub arity: usize,
}

impl HookFn {
    /// Find `name` in the script's function table.
    ///
    /// When several overloads exist the one taking the most arguments (up to
    /// `max_arity`) wins. A function that only exists with more parameters
    /// than the hook supplies is rejected.
    pub fn find(
        ast: &AST,
        name: &'static str,
        max_arity: usize,
    ) -> std::result::Result<Option<Self>, String> {
        let arities: Vec<usize> = ast
            .iter_functions()
            .filter(|f| f.name == name)
            .map(|f| f.params.len())
            .collect();

        if arities.is_empty() {
            return Ok(None);
        }

        arities
            .iter()
            .copied()
            .filter(|arity| *arity <= max_arity)
            .max()
            .map(|arity| Some(HookFn { name, arity }))
            .ok_or_else(|| format!("`{}` accepts at most {} parameter(s)", name, max_arity))
    }

    /// Keep only the leading arguments the script declared
    pub fn args<const N: usize>(&self, all: [Dynamic; N]) -> Vec<Dynamic> {
        all.into_iter().take(self.arity).collect()
    }
}

/// A script compiled and initialized inside one sandbox
#[derive(Debug, Clone)]
pub struct LoadedScript {
    name: String,
    compiled: CompiledScript,
}

impl LoadedScript {
    pub(crate) fn new(name: String, compiled: CompiledScript) -> Self {
        Self { name, compiled }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ast(&self) -> &AST {
        self.compiled.ast()
    }

    fn find_hook(&self, name: &'static str, max_arity: usize) -> Result<Option<HookFn>> {
        HookFn::find(self.ast(), name, max_arity).map_err(|e| {
            ProcessorError::SandboxConstruction(format!("{}: {}", self.name, e))
        })
    }
}

/// Result of one transformation step
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Hand the value to the next step
    Continue(Dynamic),
    /// Stop the chain; the event is not delivered
    Drop,
}

impl StepOutcome {
    /// `()` and `false` drop the event; every other value continues.
    pub fn from_value(value: Dynamic) -> Self {
        if value.is_unit() || matches!(value.as_bool(), Ok(false)) {
            StepOutcome::Drop
        } else {
            StepOutcome::Continue(value)
        }
    }

    pub fn is_drop(&self) -> bool {
        matches!(self, StepOutcome::Drop)
    }
}

/// A loaded transformation
#[derive(Debug, Clone)]
pub struct TransformStep {
    id: String,
    script: LoadedScript,
    entry: HookFn,
}

impl TransformStep {
    pub const ENTRY: &'static str = "transform";

    pub(crate) fn from_script(id: &str, script: LoadedScript) -> Result<Self> {
        let entry = script.find_hook(Self::ENTRY, 2)?.ok_or_else(|| {
            ProcessorError::SandboxConstruction(format!(
                "{} does not define fn {}(event, ctx)",
                script.name(),
                Self::ENTRY
            ))
        })?;

        Ok(Self {
            id: id.to_string(),
            script,
            entry,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run the step against the working event
    pub fn apply(
        &self,
        sandbox: &ScriptSandbox,
        event: Dynamic,
        ctx: &EventContext,
    ) -> Result<StepOutcome> {
        let args = self.entry.args([event, Dynamic::from(ctx.clone())]);
        sandbox
            .call(&self.script, &self.entry, args)
            .map(StepOutcome::from_value)
            .map_err(|e| ProcessorError::StepExecution {
                step: self.id.clone(),
                message: describe_script_error(&e),
            })
    }
}

/// A loaded destination with its optional hooks
#[derive(Debug, Clone)]
pub struct DestinationHooks {
    id: String,
    script: LoadedScript,
    /// Shared value: every hook of the batch sees the same object
    config: Dynamic,
    setup: Option<HookFn>,
    execute: Option<HookFn>,
    teardown: Option<HookFn>,
}

impl DestinationHooks {
    pub(crate) fn from_script(id: &str, script: LoadedScript, config: Dynamic) -> Result<Self> {
        Ok(Self {
            setup: script.find_hook("setup", 1)?,
            execute: script.find_hook("execute", 3)?,
            teardown: script.find_hook("teardown", 1)?,
            id: id.to_string(),
            script,
            config: config.into_shared(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_setup(&self) -> bool {
        self.setup.is_some()
    }

    pub fn has_execute(&self) -> bool {
        self.execute.is_some()
    }

    pub fn has_teardown(&self) -> bool {
        self.teardown.is_some()
    }

    /// Current state of the batch's config object, including hook writes
    pub fn config(&self) -> Dynamic {
        self.config.flatten_clone()
    }

    pub fn setup(&self, sandbox: &ScriptSandbox) -> Result<()> {
        self.lifecycle(sandbox, self.setup.as_ref())
    }

    pub fn teardown(&self, sandbox: &ScriptSandbox) -> Result<()> {
        self.lifecycle(sandbox, self.teardown.as_ref())
    }

    /// Deliver one event. A destination without `execute` accepts silently.
    pub fn execute(
        &self,
        sandbox: &ScriptSandbox,
        event: Dynamic,
        ctx: &EventContext,
    ) -> Result<()> {
        let Some(hook) = &self.execute else {
            return Ok(());
        };

        let args = hook.args([event, Dynamic::from(ctx.clone()), self.config.clone()]);
        sandbox
            .call(&self.script, hook, args)
            .map(|_| ())
            .map_err(|e| ProcessorError::StepExecution {
                step: self.script.name().to_string(),
                message: describe_script_error(&e),
            })
    }

    fn lifecycle(&self, sandbox: &ScriptSandbox, hook: Option<&HookFn>) -> Result<()> {
        let Some(hook) = hook else {
            return Ok(());
        };

        let args = hook.args([self.config.clone()]);
        sandbox
            .call(&self.script, hook, args)
            .map(|_| ())
            .map_err(|e| ProcessorError::DestinationHook {
                hook: hook.name,
                message: describe_script_error(&e),
            })
    }
}

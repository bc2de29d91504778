//! Rhai Scripting Sandbox for Transformations and Destinations
//!
//! This module runs operator-authored Rhai scripts against events. Every
//! batch gets its own [`ScriptSandbox`]: a fresh engine, a fresh log sink and
//! no access to anything beyond the arguments a script is called with.
//!
//! ## Transformation Scripts
//!
//! A transformation defines `transform`, taking the event and optionally the
//! per-event context. Returning the (possibly modified) event continues the
//! chain; returning `()` or `false` drops the event.
//!
//! ```rhai
//! fn transform(event, ctx) {
//!     if event.type == "heartbeat" {
//!         return ();
//!     }
//!     event.user_id = event.user.id;
//!     ctx["enriched"] = true;
//!     event
//! }
//! ```
//!
//! ## Destination Scripts
//!
//! A destination may define any of three hooks. Each may declare fewer
//! parameters than shown and then only receives the leading arguments.
//!
//! ```rhai
//! fn setup(config) {
//!     console::info("connecting to", config.endpoint);
//!     config.session = `${config.endpoint}/session/1`;
//!     config.sent = 0;
//! }
//!
//! fn execute(event, ctx, config) {
//!     if ctx.contains("enriched") {
//!         console::log("delivering to", config.session, event);
//!         config.sent += 1;
//!     }
//! }
//!
//! fn teardown(config) {
//!     console::info("closing", config.session, "after", config.sent);
//! }
//! ```
//!
//! All three hooks of one batch receive the same `config` object. Anything
//! `setup` stores on it (a session, a token, a buffer) is visible to every
//! `execute` call and to `teardown`. The object is rebuilt from the stored
//! destination configuration for each batch, so nothing leaks between
//! batches. Top-level `let` variables are not visible inside hooks.
//!
//! ## Diagnostics
//!
//! - `console::log(..)`, `console::info(..)`, `console::warn(..)`,
//!   `console::error(..)` - up to [`MAX_CONSOLE_ARGS`] arguments, recorded as
//!   `LEVEL: arg1 arg2 ..`
//! - `print(..)` / `debug(..)` - recorded at `LOG` level
//!
//! ## Context
//!
//! `ctx` is scratch state shared by every step and the destination for one
//! event: `ctx["key"] = value`, `ctx["key"]`, `ctx.contains("key")`,
//! `ctx.keys()`, `ctx.len()`.

mod console;
mod hooks;
mod sandbox;

pub use console::{format_line, render_args, ConsoleLevel, LogSink, MAX_CONSOLE_ARGS};
pub use hooks::{DestinationHooks, EventContext, HookFn, LoadedScript, StepOutcome, TransformStep};
pub use sandbox::{SandboxLimits, ScriptSandbox};

use crate::config::DEFAULT_SCRIPT_CACHE_CAPACITY;
use crate::error::{ProcessorError, Result};
use lru::LruCache;
use rhai::{Engine, AST};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// A compiled script that can be loaded into any sandbox
#[derive(Clone)]
pub struct CompiledScript {
    /// The compiled AST
    ast: Arc<AST>,
    /// The original source code
    source: Arc<str>,
    /// Name of the record the script was first compiled for
    name: String,
}

impl CompiledScript {
    pub fn ast(&self) -> &AST {
        &self.ast
    }

    /// Get the source code of this script
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Get the name of this script
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledScript")
            .field("name", &self.name)
            .field("source_len", &self.source.len())
            .finish()
    }
}

/// Cache for compiled scripts to avoid recompiling them for every batch
pub struct ScriptCache {
    /// Map from script source to compiled script, least recently used evicted first
    cache: LruCache<String, CompiledScript>,
}

impl ScriptCache {
    /// Create a cache holding at most `capacity` scripts
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Get a cached script or compile and cache it
    pub fn get_or_compile(
        &mut self,
        engine: &Engine,
        name: &str,
        source: &str,
    ) -> Result<CompiledScript> {
        if let Some(script) = self.cache.get(source) {
            return Ok(script.clone());
        }

        let ast = engine.compile(source).map_err(|e| {
            ProcessorError::SandboxConstruction(format!("Compilation error in {}: {}", name, e))
        })?;

        let script = CompiledScript {
            ast: Arc::new(ast),
            source: Arc::from(source),
            name: name.to_string(),
        };

        self.cache.put(source.to_string(), script.clone());
        Ok(script)
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Remove a specific script from the cache
    pub fn invalidate(&mut self, source: &str) {
        self.cache.pop(source);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl std::fmt::Debug for ScriptCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptCache")
            .field("len", &self.cache.len())
            .field("capacity", &self.cache.cap())
            .finish()
    }
}

impl Default for ScriptCache {
    fn default() -> Self {
        Self::new(DEFAULT_SCRIPT_CACHE_CAPACITY)
    }
}

/// Thread-safe script cache wrapper
pub type SharedScriptCache = Arc<Mutex<ScriptCache>>;

/// Create a new shared script cache
pub fn create_shared_cache(capacity: usize) -> SharedScriptCache {
    Arc::new(Mutex::new(ScriptCache::new(capacity)))
}

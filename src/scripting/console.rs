//! Diagnostic capture for scripts.
//!
//! Scripts never write to stdout or stderr. Every `console::*`, `print` and
//! `debug` call is rendered to one line and appended to a [`LogSink`] owned
//! by the batch that created the sandbox.

use super::hooks::EventContext;
use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Module};
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Severity of a diagnostic line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleLevel {
    Log,
    Error,
    Warn,
    Info,
}

impl ConsoleLevel {
    pub const ALL: [ConsoleLevel; 4] = [
        ConsoleLevel::Log,
        ConsoleLevel::Error,
        ConsoleLevel::Warn,
        ConsoleLevel::Info,
    ];

    /// Line prefix, e.g. `WARN`
    pub fn label(&self) -> &'static str {
        match self {
            ConsoleLevel::Log => "LOG",
            ConsoleLevel::Error => "ERROR",
            ConsoleLevel::Warn => "WARN",
            ConsoleLevel::Info => "INFO",
        }
    }

    /// Name of the function scripts call, e.g. `console::warn`
    pub fn function_name(&self) -> &'static str {
        match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Error => "error",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Info => "info",
        }
    }
}

impl Display for ConsoleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Buffer of diagnostic lines.
///
/// Clones share the same buffer; the sandbox holds one clone and the batch
/// processor drains another between events.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        self.lock().push(line.into());
    }

    /// Record one diagnostic call
    pub fn record(&self, level: ConsoleLevel, args: &[Dynamic]) {
        self.push(format_line(level, render_args(args)));
    }

    /// Remove and return every buffered line
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock())
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the buffered lines, leaving the buffer untouched
    pub fn lines(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        // A panic while holding the lock cannot leave a Vec<String> torn
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Render diagnostic arguments separated by single spaces
pub fn render_args(args: &[Dynamic]) -> Result<String, serde_json::Error> {
    let parts = args
        .iter()
        .map(render_value)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(" "))
}

fn render_value(value: &Dynamic) -> Result<String, serde_json::Error> {
    if let Some(text) = value.read_lock::<ImmutableString>() {
        return Ok(text.to_string());
    }
    if let Some(ctx) = value.read_lock::<EventContext>() {
        return serde_json::to_string(&Dynamic::from_map(ctx.snapshot()));
    }
    serde_json::to_string(value)
}

/// Build the final line for a diagnostic call.
///
/// A rendering failure never aborts the script; it is recorded in place of
/// the call instead.
pub fn format_line<E: Display>(level: ConsoleLevel, rendered: Result<String, E>) -> String {
    match rendered {
        Ok(text) => format!("{}: {}", level.label(), text),
        Err(e) => format!("{}: {} (error while parsing log)", ConsoleLevel::Log.label(), e),
    }
}

/// Most arguments one `console::*` call accepts
pub const MAX_CONSOLE_ARGS: usize = 12;

/// Register one native function per listed arity, each recording every argument
macro_rules! register_console_fn {
    ($module:expr, $name:expr, $level:expr, $sink:expr, $( ( $($arg:ident),* ) ),+ $(,)?) => {
        $(
            let s = $sink.clone();
            let level = $level;
            $module.set_native_fn(
                $name,
                move |$($arg: Dynamic),*| -> Result<(), Box<EvalAltResult>> {
                    s.record(level, &[$($arg),*]);
                    Ok(())
                },
            );
        )+
    };
}

/// Install the `console` module and route `print`/`debug` into `sink`
pub(crate) fn register(engine: &mut Engine, sink: &LogSink) {
    let mut module = Module::new();

    for level in ConsoleLevel::ALL {
        register_console_fn!(
            module,
            level.function_name(),
            level,
            sink,
            (),
            (a),
            (a, b),
            (a, b, c),
            (a, b, c, d),
            (a, b, c, d, e),
            (a, b, c, d, e, f),
            (a, b, c, d, e, f, g),
            (a, b, c, d, e, f, g, h),
            (a, b, c, d, e, f, g, h, i),
            (a, b, c, d, e, f, g, h, i, j),
            (a, b, c, d, e, f, g, h, i, j, k),
            (a, b, c, d, e, f, g, h, i, j, k, l),
        );
    }

    engine.register_static_module("console", module.into());

    let s = sink.clone();
    engine.on_print(move |text| s.push(format!("{}: {}", ConsoleLevel::Log.label(), text)));

    let s = sink.clone();
    engine.on_debug(move |text, _source, _pos| {
        s.push(format!("{}: {}", ConsoleLevel::Log.label(), text))
    });
}

//! Error handling for the event processor
//!
//! This module defines the error type shared by metadata resolution, the
//! script sandbox and the batch processor, plus a Result alias.
//!
//! Batch-level variants abort a whole batch and are reported once; the
//! per-event [`ProcessorError::StepExecution`] variant never escapes the event
//! loop and is turned into a failed result instead.

use thiserror::Error;

/// Main error type for event processing operations
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// No pipeline exists with the requested identifier
    #[error("Pipeline not found")]
    PipelineNotFound(String),

    /// The pipeline exists but is switched off
    #[error("Pipeline is not active")]
    PipelineInactive(String),

    /// The pipeline's destination is missing or switched off
    #[error("Destination is inactive or invalid")]
    DestinationInvalid(String),

    /// A transformation step or destination `execute` raised an error
    #[error("{message}")]
    StepExecution { step: String, message: String },

    /// A script could not be compiled or loaded into the sandbox
    #[error("Sandbox construction error: {0}")]
    SandboxConstruction(String),

    /// Destination `setup` or `teardown` raised an error
    #[error("Destination {hook} failed: {message}")]
    DestinationHook { hook: &'static str, message: String },

    /// The blocking task running the scripts panicked or was cancelled
    #[error("Script task failed: {0}")]
    ScriptTask(String),

    /// Errors reported by the metadata store
    #[error("Metadata store error: {0}")]
    Store(String),

    /// Errors reported by the metadata cache
    #[error("Metadata cache error: {0}")]
    Cache(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ProcessorError>,
    },
}

impl ProcessorError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ProcessorError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Render a Rhai error the way script authors expect to read it.
///
/// Errors raised inside script functions arrive wrapped in one
/// `ErrorInFunctionCall` layer per call frame; `throw "x"` yields the thrown
/// value itself rather than the engine's "Runtime error" prefix.
pub fn describe_script_error(err: &rhai::EvalAltResult) -> String {
    use rhai::EvalAltResult;

    match err {
        EvalAltResult::ErrorInFunctionCall(.., inner, _) => describe_script_error(inner),
        EvalAltResult::ErrorRuntime(value, ..) => value.to_string(),
        EvalAltResult::ErrorTerminated(token, ..) => format!("Script terminated: {}", token),
        other => other.to_string(),
    }
}

/// Result type alias for event processing operations
pub type Result<T> = std::result::Result<T, ProcessorError>;

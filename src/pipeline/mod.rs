//! Batch processing of events through a pipeline.
//!
//! A batch runs through one [`ScriptSandbox`](crate::scripting::ScriptSandbox)
//! from start to finish:
//!
//! ```text
//! Resolving ──► SandboxInit ──► DestinationSetup ──► EventLoop ──► DestinationTeardown ──► Done
//!     │              │                 │                                    │
//!     └──────────────┴─────────────────┴──────────────► Failed ◄────────────┘
//! ```
//!
//! Resolving happens on the calling task. Everything from `SandboxInit` on
//! runs on tokio's blocking pool, since script calls are CPU-bound and may
//! run until their time limit.
//!
//! Inside the event loop every event is isolated: a failing step only fails
//! that event's result, and the next event starts with a fresh context and an
//! empty log buffer.

pub mod processor;

pub use processor::{truncate_chars, BatchState, EventBatchProcessor, MAX_FAILURE_LOG_CHARS};

//! # event-processor: Scripted Event Pipelines
//!
//! Runs batches of inbound events through operator-configured pipelines. A
//! pipeline is an ordered chain of transformation scripts followed by a
//! destination script, all written in Rhai and executed in a per-batch
//! sandbox.
//!
//! ## Architecture
//!
//! - **Metadata**: pipelines, transformations and destinations are read
//!   through a cache-first [`PipelineResolver`](metadata::PipelineResolver)
//! - **Scripting**: one [`ScriptSandbox`](scripting::ScriptSandbox) per batch
//!   with resource ceilings and captured diagnostics
//! - **Pipeline**: the [`EventBatchProcessor`] drives setup, the per-event
//!   chain, delivery and teardown, isolating failures per event
//!
//! ## Example
//!
//! ```ignore
//! use event_processor::{config::Catalog, EventBatchProcessor, Event, ProcessorConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalog = Catalog::load("catalog.toml")?;
//!     let processor = EventBatchProcessor::from_catalog(catalog, &ProcessorConfig::default());
//!
//!     let events = vec![Event::new("e1", serde_json::json!({"x": 1}))];
//!     for result in processor.process_event_batch("p1", &events).await {
//!         println!("{} {} {}", result.id, result.success, result.console_logs);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod scripting;
pub mod types;

// Re-export commonly used types
pub use config::{Catalog, ProcessorConfig};
pub use error::{ProcessorError, Result};
pub use metadata::{MetadataCache, MetadataStore, PipelineResolver};
pub use pipeline::EventBatchProcessor;
pub use scripting::ScriptSandbox;
pub use types::{Destination, Event, Pipeline, ProcessingResult, Transformation};

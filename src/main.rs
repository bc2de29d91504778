//! Event Processor - Command Line Entry Point
//!
//! Runs one batch of events through a pipeline defined in a catalog file and
//! prints the per-event results as JSON.

use anyhow::Context;
use clap::Parser;
use event_processor::config::LoggingSettings;
use event_processor::{Catalog, Event, EventBatchProcessor, ProcessorConfig};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "event-processor",
    version,
    about = "Run a batch of events through a scripted pipeline"
)]
struct Cli {
    /// Catalog of pipelines, transformations and destinations (.toml or .json)
    #[arg(long)]
    catalog: PathBuf,

    /// Pipeline to run the events through
    #[arg(long)]
    pipeline: String,

    /// Processor configuration (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON array of events; read from stdin when omitted
    #[arg(long)]
    events: Option<PathBuf>,
}

/// Install the tracing subscriber. The returned guard flushes the log file on drop.
fn init_logging(settings: &LoggingSettings) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter));

    let (file_layer, guard) = match &settings.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "event-processor.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn read_events(path: Option<&Path>) -> anyhow::Result<Vec<Event>> {
    let content = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read events from {}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin())
            .context("Failed to read events from stdin")?,
    };

    serde_json::from_str(&content).context("Events must be a JSON array of {id, payload}")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ProcessorConfig::load(path)?,
        None => ProcessorConfig::load_or_default(None),
    };
    let _guard = init_logging(&config.logging);

    tracing::info!(pipeline_id = %cli.pipeline, "Starting event processor");

    let catalog = Catalog::load(&cli.catalog)?;
    let events = read_events(cli.events.as_deref())?;
    let processor = EventBatchProcessor::from_catalog(catalog, &config);

    let results = processor.process_event_batch(&cli.pipeline, &events).await;
    let failed = results.iter().filter(|r| !r.success).count();
    tracing::info!(events = results.len(), failed, "Batch finished");

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

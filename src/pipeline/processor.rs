//! The batch processor.
//!
//! [`EventBatchProcessor`] is the entry point other services call. It never
//! returns an error: every input event gets a [`ProcessingResult`], and
//! batch-level failures are turned into one failure result per event.

use crate::config::{Catalog, ProcessorConfig};
use crate::error::{ProcessorError, Result};
use crate::metadata::{InMemoryMetadataCache, InMemoryStore, PipelineResolver};
use crate::scripting::{
    create_shared_cache, ConsoleLevel, DestinationHooks, EventContext, SandboxLimits,
    ScriptSandbox, SharedScriptCache, StepOutcome, TransformStep,
};
use crate::types::{Destination, Event, Pipeline, ProcessingResult, Transformation};
use std::sync::Arc;

/// Longest diagnostic text reported for a failed event, in characters
pub const MAX_FAILURE_LOG_CHARS: usize = 3999;

/// Lifecycle of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Resolving,
    SandboxInit,
    DestinationSetup,
    EventLoop,
    DestinationTeardown,
    Done,
    Failed,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Resolving => "resolving",
            BatchState::SandboxInit => "sandbox_init",
            BatchState::DestinationSetup => "destination_setup",
            BatchState::EventLoop => "event_loop",
            BatchState::DestinationTeardown => "destination_teardown",
            BatchState::Done => "done",
            BatchState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cut `text` to at most `max` characters on a character boundary
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Bookkeeping for one batch in flight
struct Batch {
    pipeline_id: String,
    state: BatchState,
    results: Vec<ProcessingResult>,
}

impl Batch {
    fn new(pipeline_id: &str, capacity: usize) -> Self {
        Self {
            pipeline_id: pipeline_id.to_string(),
            state: BatchState::Resolving,
            results: Vec::with_capacity(capacity),
        }
    }

    fn transition(&mut self, next: BatchState) {
        tracing::debug!(
            pipeline_id = %self.pipeline_id,
            from = %self.state,
            to = %next,
            "Batch state transition"
        );
        self.state = next;
    }

    /// Report a batch-level failure and produce the final result list
    fn fail(mut self, error: ProcessorError, events: &[Event]) -> Vec<ProcessingResult> {
        tracing::error!(
            pipeline_id = %self.pipeline_id,
            state = %self.state,
            error = %error,
            "Error occurred while processing events"
        );
        self.transition(BatchState::Failed);

        if !self.results.is_empty() {
            return self.results;
        }

        let message = error.to_string();
        events
            .iter()
            .map(|event| ProcessingResult::failure(event.id.clone(), message.clone()))
            .collect()
    }
}

/// Everything the sandbox phase needs, resolved up front
struct BatchPlan {
    pipeline: Pipeline,
    steps: Vec<Option<Transformation>>,
    destination: Destination,
}

impl BatchPlan {
    /// Load the scripts and run setup, the event loop and teardown
    fn run(&self, sandbox: &ScriptSandbox, batch: &mut Batch, events: &[Event]) -> Result<()> {
        let hooks = sandbox.load_destination(&self.destination)?;
        let steps = load_steps(sandbox, &self.pipeline.transformations, &self.steps)?;
        forward_lifecycle_logs(sandbox, batch);

        batch.transition(BatchState::DestinationSetup);
        let setup = hooks.setup(sandbox);
        forward_lifecycle_logs(sandbox, batch);

        if setup.is_ok() {
            batch.transition(BatchState::EventLoop);
            for event in events {
                let result = process_one(sandbox, &steps, &hooks, event);
                batch.results.push(result);
            }
        }

        batch.transition(BatchState::DestinationTeardown);
        let teardown = hooks.teardown(sandbox);
        forward_lifecycle_logs(sandbox, batch);

        match (setup, teardown) {
            (Err(e), Err(teardown_error)) => {
                tracing::warn!(
                    pipeline_id = %batch.pipeline_id,
                    "Teardown after failed setup also failed: {}",
                    teardown_error
                );
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            // Results produced before the failure are returned unchanged
            (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => {
                batch.transition(BatchState::Done);
                Ok(())
            }
        }
    }
}

/// Runs batches of events through their pipeline's steps and destination
#[derive(Debug, Clone)]
pub struct EventBatchProcessor {
    resolver: PipelineResolver,
    limits: SandboxLimits,
    /// Compiled scripts shared by every batch's sandbox
    scripts: SharedScriptCache,
}

impl EventBatchProcessor {
    pub fn new(resolver: PipelineResolver, config: &ProcessorConfig) -> Self {
        Self {
            resolver,
            limits: config.sandbox.limits(),
            scripts: create_shared_cache(config.cache.script_cache_capacity),
        }
    }

    /// Build a processor serving the records of a catalog
    pub fn from_catalog(catalog: Catalog, config: &ProcessorConfig) -> Self {
        let cache = match config.cache.metadata_ttl() {
            Some(ttl) => InMemoryMetadataCache::with_ttl(ttl),
            None => InMemoryMetadataCache::new(),
        };
        let resolver = PipelineResolver::new(
            Arc::new(InMemoryStore::from_catalog(catalog)),
            Arc::new(cache),
        );
        Self::new(resolver, config)
    }

    pub fn resolver(&self) -> &PipelineResolver {
        &self.resolver
    }

    pub fn script_cache(&self) -> &SharedScriptCache {
        &self.scripts
    }

    /// Process a single event through the pipeline named by its `pipeline_id`
    pub async fn process_event(&self, event: Event) -> ProcessingResult {
        let Some(pipeline_id) = event.pipeline_id.clone() else {
            let error = ProcessorError::PipelineNotFound(String::new());
            tracing::error!(event_id = %event.id, error = %error, "Event names no pipeline");
            return ProcessingResult::failure(event.id, error.to_string());
        };

        let id = event.id.clone();
        self.process_event_batch(&pipeline_id, std::slice::from_ref(&event))
            .await
            .pop()
            .unwrap_or_else(|| {
                let error = ProcessorError::PipelineNotFound(pipeline_id);
                ProcessingResult::failure(id, error.to_string())
            })
    }

    /// Process a batch of events, returning one result per event in input order.
    ///
    /// Metadata is resolved on the calling task. Scripts then run on the
    /// blocking pool so a slow step never stalls the async workers.
    pub async fn process_event_batch(
        &self,
        pipeline_id: &str,
        events: &[Event],
    ) -> Vec<ProcessingResult> {
        let mut batch = Batch::new(pipeline_id, events.len());

        let plan = match self.resolve(pipeline_id).await {
            Ok(plan) => plan,
            Err(e) => return batch.fail(e, events),
        };

        batch.transition(BatchState::SandboxInit);
        let limits = self.limits.clone();
        let scripts = self.scripts.clone();
        let owned = events.to_vec();
        // Keep the caller's subscriber and span on the blocking thread
        let dispatch = tracing::dispatcher::get_default(|d| d.clone());
        let span = tracing::Span::current();

        let task = tokio::task::spawn_blocking(move || {
            tracing::dispatcher::with_default(&dispatch, || {
                let _entered = span.enter();
                let sandbox = ScriptSandbox::new(limits, scripts);
                let outcome = plan.run(&sandbox, &mut batch, &owned);
                (batch, outcome)
            })
        });

        match task.await {
            Ok((batch, Ok(()))) => batch.results,
            Ok((batch, Err(e))) => batch.fail(e, events),
            Err(join_error) => {
                let mut lost = Batch::new(pipeline_id, 0);
                lost.state = BatchState::SandboxInit;
                lost.fail(ProcessorError::ScriptTask(join_error.to_string()), events)
            }
        }
    }

    async fn resolve(&self, pipeline_id: &str) -> Result<BatchPlan> {
        let pipeline = self
            .resolver
            .resolve_pipeline(pipeline_id)
            .await?
            .ok_or_else(|| ProcessorError::PipelineNotFound(pipeline_id.to_string()))?;

        if !pipeline.active {
            return Err(ProcessorError::PipelineInactive(pipeline.id));
        }

        let resolved = self.resolver.resolve_steps(&pipeline).await?;
        let destination = resolved
            .destination
            .filter(|d| d.active)
            .ok_or_else(|| ProcessorError::DestinationInvalid(pipeline.destination_id.clone()))?;

        Ok(BatchPlan {
            pipeline,
            steps: resolved.steps,
            destination,
        })
    }
}

/// Load the active steps in declared order
fn load_steps(
    sandbox: &ScriptSandbox,
    ids: &[String],
    resolved: &[Option<Transformation>],
) -> Result<Vec<TransformStep>> {
    let mut steps = Vec::with_capacity(resolved.len());

    for (id, slot) in ids.iter().zip(resolved) {
        match slot {
            Some(transformation) if transformation.active => {
                steps.push(sandbox.load_transformation(transformation)?);
            }
            Some(_) => tracing::debug!(transformation_id = %id, "Skipping inactive transformation"),
            None => tracing::debug!(transformation_id = %id, "Skipping unresolved transformation"),
        }
    }

    Ok(steps)
}

/// Lines logged outside of any event go to tracing instead of a result
fn forward_lifecycle_logs(sandbox: &ScriptSandbox, batch: &Batch) {
    for line in sandbox.logs().take() {
        tracing::debug!(pipeline_id = %batch.pipeline_id, state = %batch.state, "{}", line);
    }
}

/// Run one event and capture its diagnostics
fn process_one(
    sandbox: &ScriptSandbox,
    steps: &[TransformStep],
    hooks: &DestinationHooks,
    event: &Event,
) -> ProcessingResult {
    sandbox.logs().clear();
    let ctx = EventContext::new();

    let outcome = run_chain(sandbox, steps, hooks, event, &ctx);
    let mut lines = sandbox.logs().take();

    match outcome {
        Ok(()) => ProcessingResult::success(event.id.clone(), lines.join("\n")),
        Err(e) => {
            lines.push(format!(
                "{}: {} (error while processing event)",
                ConsoleLevel::Error.label(),
                e
            ));
            let text = lines.join("\n");
            ProcessingResult::failure(
                event.id.clone(),
                truncate_chars(&text, MAX_FAILURE_LOG_CHARS),
            )
        }
    }
}

fn run_chain(
    sandbox: &ScriptSandbox,
    steps: &[TransformStep],
    hooks: &DestinationHooks,
    event: &Event,
    ctx: &EventContext,
) -> Result<()> {
    let mut working = sandbox.to_script_value(&event.payload)?;

    for step in steps {
        match step.apply(sandbox, working, ctx)? {
            StepOutcome::Continue(next) => working = next,
            StepOutcome::Drop => {
                tracing::trace!(event_id = %event.id, step = step.id(), "Event dropped");
                return Ok(());
            }
        }
    }

    hooks.execute(sandbox, working, ctx)
}

//! Pipeline resolution through the metadata cache.

use super::{cache_key, CacheableRecord, SharedMetadataCache, SharedMetadataStore};
use crate::error::Result;
use crate::types::{Destination, Pipeline, Transformation};
use futures::future::join_all;
use std::future::Future;

/// The executable shape of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSteps {
    /// One slot per declared transformation id, in declared order.
    /// `None` marks an id the store does not know; the slot is kept so the
    /// processor can skip it explicitly.
    pub steps: Vec<Option<Transformation>>,
    pub destination: Option<Destination>,
}

/// Resolves pipelines and their steps, cache first.
#[derive(Clone)]
pub struct PipelineResolver {
    store: SharedMetadataStore,
    cache: SharedMetadataCache,
}

impl PipelineResolver {
    pub fn new(store: SharedMetadataStore, cache: SharedMetadataCache) -> Self {
        Self { store, cache }
    }

    pub async fn resolve_pipeline(&self, id: &str) -> Result<Option<Pipeline>> {
        self.read_through(id, || self.store.fetch_pipeline(id)).await
    }

    pub async fn resolve_transformation(&self, id: &str) -> Result<Option<Transformation>> {
        self.read_through(id, || self.store.fetch_transformation(id)).await
    }

    pub async fn resolve_destination(&self, id: &str) -> Result<Option<Destination>> {
        self.read_through(id, || self.store.fetch_destination(id)).await
    }

    /// Resolve every declared step plus the destination of `pipeline`.
    ///
    /// Steps are looked up concurrently; the returned list keeps the declared
    /// order. Any store error fails the whole resolution.
    pub async fn resolve_steps(&self, pipeline: &Pipeline) -> Result<ResolvedSteps> {
        let lookups = pipeline
            .transformations
            .iter()
            .map(|id| self.resolve_transformation(id));

        let steps = join_all(lookups)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        for (id, step) in pipeline.transformations.iter().zip(&steps) {
            if step.is_none() {
                tracing::warn!(
                    pipeline_id = %pipeline.id,
                    transformation_id = %id,
                    "Transformation not found, step will be skipped"
                );
            }
        }

        let destination = self.resolve_destination(&pipeline.destination_id).await?;

        Ok(ResolvedSteps { steps, destination })
    }

    async fn read_through<T, F, Fut>(&self, id: &str, fetch: F) -> Result<Option<T>>
    where
        T: CacheableRecord,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let key = cache_key(T::KIND, id);

        match self.cache.get(&key).await {
            Ok(Some(cached)) => {
                if let Some(record) = T::from_cached(cached) {
                    tracing::trace!(%key, "Metadata cache hit");
                    return Ok(Some(record));
                }
                tracing::warn!(%key, "Cached record has the wrong kind, refetching");
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%key, "Metadata cache read failed: {}", e),
        }

        let record = fetch().await?;
        tracing::debug!(%key, found = record.is_some(), "Loaded metadata from store");

        if let Some(record) = &record {
            if let Err(e) = self.cache.set(&key, record.clone().into_cached()).await {
                tracing::warn!(%key, "Metadata cache write failed: {}", e);
            }
        }

        Ok(record)
    }
}

impl std::fmt::Debug for PipelineResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineResolver").finish_non_exhaustive()
    }
}

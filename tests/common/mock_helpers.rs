//! Store and cache doubles for integration tests

use async_trait::async_trait;
use event_processor::config::Catalog;
use event_processor::metadata::{
    CachedRecord, InMemoryMetadataCache, InMemoryStore, MetadataCache, MetadataStore,
};
use event_processor::{
    Destination, EventBatchProcessor, Pipeline, PipelineResolver, ProcessorConfig,
    ProcessorError, Result, Transformation,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Store that counts every lookup it serves
pub struct CountingStore {
    inner: InMemoryStore,
    pipelines: AtomicUsize,
    transformations: AtomicUsize,
    destinations: AtomicUsize,
}

impl CountingStore {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            inner: InMemoryStore::from_catalog(catalog),
            pipelines: AtomicUsize::new(0),
            transformations: AtomicUsize::new(0),
            destinations: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    pub fn pipeline_queries(&self) -> usize {
        self.pipelines.load(Ordering::SeqCst)
    }

    pub fn transformation_queries(&self) -> usize {
        self.transformations.load(Ordering::SeqCst)
    }

    pub fn destination_queries(&self) -> usize {
        self.destinations.load(Ordering::SeqCst)
    }

    pub fn total_queries(&self) -> usize {
        self.pipeline_queries() + self.transformation_queries() + self.destination_queries()
    }
}

#[async_trait]
impl MetadataStore for CountingStore {
    async fn fetch_pipeline(&self, id: &str) -> Result<Option<Pipeline>> {
        self.pipelines.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_pipeline(id).await
    }

    async fn fetch_transformation(&self, id: &str) -> Result<Option<Transformation>> {
        self.transformations.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_transformation(id).await
    }

    async fn fetch_destination(&self, id: &str) -> Result<Option<Destination>> {
        self.destinations.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_destination(id).await
    }
}

/// Store whose every lookup fails
pub struct FailingStore;

#[async_trait]
impl MetadataStore for FailingStore {
    async fn fetch_pipeline(&self, _id: &str) -> Result<Option<Pipeline>> {
        Err(ProcessorError::Store("connection refused".into()))
    }

    async fn fetch_transformation(&self, _id: &str) -> Result<Option<Transformation>> {
        Err(ProcessorError::Store("connection refused".into()))
    }

    async fn fetch_destination(&self, _id: &str) -> Result<Option<Destination>> {
        Err(ProcessorError::Store("connection refused".into()))
    }
}

/// Cache that is never reachable
pub struct UnavailableCache;

#[async_trait]
impl MetadataCache for UnavailableCache {
    async fn get(&self, _key: &str) -> Result<Option<CachedRecord>> {
        Err(ProcessorError::Cache("cache offline".into()))
    }

    async fn set(&self, _key: &str, _record: CachedRecord) -> Result<()> {
        Err(ProcessorError::Cache("cache offline".into()))
    }
}

/// Processor over a counting store and a fresh in-memory cache
pub fn counting_processor(catalog: Catalog) -> (EventBatchProcessor, Arc<CountingStore>) {
    let store = Arc::new(CountingStore::new(catalog));
    let resolver = PipelineResolver::new(store.clone(), Arc::new(InMemoryMetadataCache::new()));
    let processor = EventBatchProcessor::new(resolver, &ProcessorConfig::default());
    (processor, store)
}

/// Processor over a plain catalog with default configuration
pub fn processor(catalog: Catalog) -> EventBatchProcessor {
    EventBatchProcessor::from_catalog(catalog, &ProcessorConfig::default())
}

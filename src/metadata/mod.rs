//! Read-only access to pipeline metadata.
//!
//! Batches never talk to the store directly: every lookup goes through a
//! [`PipelineResolver`], which consults a [`MetadataCache`] first and only
//! queries the [`MetadataStore`] on a miss.
//!
//! ```text
//! resolve_pipeline("p1")
//!   ├─► cache.get("pipeline-proc::p1")      hit  → return copy
//!   └─► store.fetch_pipeline("p1")          miss → cache.set(..) → return
//! ```
//!
//! Both collaborators are trait objects shared by reference across
//! concurrent batches; neither is a process-wide global.

pub mod cache;
pub mod resolver;
pub mod store;

pub use cache::InMemoryMetadataCache;
pub use resolver::{PipelineResolver, ResolvedSteps};
pub use store::InMemoryStore;

use crate::error::Result;
use crate::types::{Destination, EntityKind, Pipeline, Transformation};
use async_trait::async_trait;
use std::sync::Arc;

/// Point lookups against the persisted metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn fetch_pipeline(&self, id: &str) -> Result<Option<Pipeline>>;

    async fn fetch_transformation(&self, id: &str) -> Result<Option<Transformation>>;

    async fn fetch_destination(&self, id: &str) -> Result<Option<Destination>>;
}

/// Key/value cache of metadata records.
///
/// Values are owned copies; a `set` replaces the previous value wholesale.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedRecord>>;

    async fn set(&self, key: &str, record: CachedRecord) -> Result<()>;
}

pub type SharedMetadataStore = Arc<dyn MetadataStore>;
pub type SharedMetadataCache = Arc<dyn MetadataCache>;

/// A record as held by the cache
#[derive(Debug, Clone, PartialEq)]
pub enum CachedRecord {
    Pipeline(Pipeline),
    Transformation(Transformation),
    Destination(Destination),
}

impl CachedRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            CachedRecord::Pipeline(_) => EntityKind::Pipeline,
            CachedRecord::Transformation(_) => EntityKind::Transformation,
            CachedRecord::Destination(_) => EntityKind::Destination,
        }
    }
}

/// Cache key for a record: `<kind>-proc::<id>`
pub fn cache_key(kind: EntityKind, id: &str) -> String {
    format!("{}-proc::{}", kind.as_str(), id)
}

/// Records that can round-trip through a [`MetadataCache`]
pub trait CacheableRecord: Clone + Send + Sized {
    const KIND: EntityKind;

    fn into_cached(self) -> CachedRecord;

    fn from_cached(record: CachedRecord) -> Option<Self>;
}

impl CacheableRecord for Pipeline {
    const KIND: EntityKind = EntityKind::Pipeline;

    fn into_cached(self) -> CachedRecord {
        CachedRecord::Pipeline(self)
    }

    fn from_cached(record: CachedRecord) -> Option<Self> {
        match record {
            CachedRecord::Pipeline(p) => Some(p),
            _ => None,
        }
    }
}

impl CacheableRecord for Transformation {
    const KIND: EntityKind = EntityKind::Transformation;

    fn into_cached(self) -> CachedRecord {
        CachedRecord::Transformation(self)
    }

    fn from_cached(record: CachedRecord) -> Option<Self> {
        match record {
            CachedRecord::Transformation(t) => Some(t),
            _ => None,
        }
    }
}

impl CacheableRecord for Destination {
    const KIND: EntityKind = EntityKind::Destination;

    fn into_cached(self) -> CachedRecord {
        CachedRecord::Destination(self)
    }

    fn from_cached(record: CachedRecord) -> Option<Self> {
        match record {
            CachedRecord::Destination(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_key(EntityKind::Pipeline, "p1"), "pipeline-proc::p1");
        assert_eq!(
            cache_key(EntityKind::Transformation, "t-9"),
            "transformation-proc::t-9"
        );
        assert_eq!(
            cache_key(EntityKind::Destination, "d1"),
            "destination-proc::d1"
        );
    }

    #[test]
    fn test_from_cached_rejects_other_kinds() {
        let record = CachedRecord::Transformation(Transformation {
            id: "t1".into(),
            script: String::new(),
            version: 1,
            active: true,
        });
        assert_eq!(record.kind(), EntityKind::Transformation);
        assert!(Pipeline::from_cached(record.clone()).is_none());
        assert!(Transformation::from_cached(record).is_some());
    }
}

//! In-process metadata cache.

use super::{cache_key, CachedRecord, MetadataCache};
use crate::error::{ProcessorError, Result};
use crate::types::EntityKind;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    record: CachedRecord,
    stored_at: Instant,
}

/// Read-through cache kept in process memory.
///
/// Entries live until they are invalidated or, when a TTL is configured,
/// until they expire. Reads take a shared lock so concurrent batches never
/// block each other on hits.
#[derive(Debug, Default)]
pub struct InMemoryMetadataCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Option<Duration>,
}

impl InMemoryMetadataCache {
    /// Create a cache whose entries never expire
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache whose entries expire `ttl` after being stored
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    /// Drop the cached copy of one record, e.g. after it was edited
    pub fn invalidate(&self, kind: EntityKind, id: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|e| {
            ProcessorError::Cache(format!("Failed to acquire cache lock: {}", e))
        })?;
        entries.remove(&cache_key(kind, id));
        Ok(())
    }

    /// Clear the cache
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write().map_err(|e| {
            ProcessorError::Cache(format!("Failed to acquire cache lock: {}", e))
        })?;
        entries.clear();
        Ok(())
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        match self.ttl {
            Some(ttl) => entry.stored_at.elapsed() < ttl,
            None => true,
        }
    }
}

#[async_trait]
impl MetadataCache for InMemoryMetadataCache {
    async fn get(&self, key: &str) -> Result<Option<CachedRecord>> {
        let entries = self.entries.read().map_err(|e| {
            ProcessorError::Cache(format!("Failed to acquire cache lock: {}", e))
        })?;

        Ok(entries
            .get(key)
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| entry.record.clone()))
    }

    async fn set(&self, key: &str, record: CachedRecord) -> Result<()> {
        let mut entries = self.entries.write().map_err(|e| {
            ProcessorError::Cache(format!("Failed to acquire cache lock: {}", e))
        })?;

        if self.ttl.is_some() {
            entries.retain(|_, entry| self.is_fresh(entry));
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                record,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }
}

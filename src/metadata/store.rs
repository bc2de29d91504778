//! Catalog-backed metadata store.

use super::MetadataStore;
use crate::config::Catalog;
use crate::error::{ProcessorError, Result};
use crate::types::{Destination, Pipeline, Transformation};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    pipelines: HashMap<String, Pipeline>,
    transformations: HashMap<String, Transformation>,
    destinations: HashMap<String, Destination>,
}

/// Metadata store holding every record in memory.
///
/// Lookups hand out clones, so callers never alias a stored row.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding every record of a catalog
    pub fn from_catalog(catalog: Catalog) -> Self {
        let tables = Tables {
            pipelines: catalog
                .pipelines
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
            transformations: catalog
                .transformations
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
            destinations: catalog
                .destinations
                .into_iter()
                .map(|d| (d.id.clone(), d))
                .collect(),
        };

        Self {
            tables: RwLock::new(tables),
        }
    }

    pub fn upsert_pipeline(&self, pipeline: Pipeline) -> Result<()> {
        self.write(|t| {
            t.pipelines.insert(pipeline.id.clone(), pipeline);
        })
    }

    pub fn upsert_transformation(&self, transformation: Transformation) -> Result<()> {
        self.write(|t| {
            t.transformations
                .insert(transformation.id.clone(), transformation);
        })
    }

    pub fn upsert_destination(&self, destination: Destination) -> Result<()> {
        self.write(|t| {
            t.destinations.insert(destination.id.clone(), destination);
        })
    }

    pub fn remove_pipeline(&self, id: &str) -> Result<Option<Pipeline>> {
        self.write(|t| t.pipelines.remove(id))
    }

    pub fn remove_transformation(&self, id: &str) -> Result<Option<Transformation>> {
        self.write(|t| t.transformations.remove(id))
    }

    pub fn remove_destination(&self, id: &str) -> Result<Option<Destination>> {
        self.write(|t| t.destinations.remove(id))
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T> {
        let tables = self
            .tables
            .read()
            .map_err(|e| ProcessorError::Store(format!("Failed to acquire store lock: {}", e)))?;
        Ok(f(&tables))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| ProcessorError::Store(format!("Failed to acquire store lock: {}", e)))?;
        Ok(f(&mut tables))
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn fetch_pipeline(&self, id: &str) -> Result<Option<Pipeline>> {
        self.read(|t| t.pipelines.get(id).cloned())
    }

    async fn fetch_transformation(&self, id: &str) -> Result<Option<Transformation>> {
        self.read(|t| t.transformations.get(id).cloned())
    }

    async fn fetch_destination(&self, id: &str) -> Result<Option<Destination>> {
        self.read(|t| t.destinations.get(id).cloned())
    }
}

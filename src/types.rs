//! Core data types for pipeline processing
//!
//! This module contains the records resolved from the metadata store and
//! the request/response types of the processing entry points.

use serde::{Deserialize, Serialize};

/// Kind of metadata record, used to namespace cache keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Pipeline,
    Transformation,
    Destination,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Pipeline => "pipeline",
            EntityKind::Transformation => "transformation",
            EntityKind::Destination => "destination",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered configuration binding a source to a destination through
/// zero or more transformation steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    #[serde(default)]
    pub source_id: Option<String>,
    pub destination_id: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Routing tag assigned by the management service
    #[serde(default)]
    pub route: Option<String>,
    /// Transformation ids in execution order
    #[serde(default)]
    pub transformations: Vec<String>,
}

/// A user-authored script mapping one event to a new event (or a drop)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformation {
    pub id: String,
    pub script: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// A user-authored script with optional setup/execute/teardown hooks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub id: String,
    pub script: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Opaque configuration handed to every hook
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_active() -> bool {
    true
}

/// An inbound event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    /// Pipeline to route through; only consulted by single-event processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            pipeline_id: None,
            payload,
        }
    }

    pub fn with_pipeline(mut self, pipeline_id: impl Into<String>) -> Self {
        self.pipeline_id = Some(pipeline_id.into());
        self
    }
}

/// Per-event verdict returned by the processing entry points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    /// Echoes the input event's identifier
    pub id: String,
    pub success: bool,
    /// Newline-joined diagnostic lines captured while processing the event
    pub console_logs: String,
}

impl ProcessingResult {
    pub fn success(id: impl Into<String>, console_logs: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: true,
            console_logs: console_logs.into(),
        }
    }

    pub fn failure(id: impl Into<String>, console_logs: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            console_logs: console_logs.into(),
        }
    }
}

//! Metadata catalog files
//!
//! A catalog lists the pipelines, transformations and destinations an
//! [`InMemoryStore`](crate::metadata::InMemoryStore) serves. It is the
//! file-based stand-in for the management service's database and is read
//! from TOML or JSON depending on the file extension.
//!
//! ```toml
//! [[pipelines]]
//! id = "p1"
//! destinationId = "d1"
//! transformations = ["t1"]
//!
//! [[transformations]]
//! id = "t1"
//! script = "fn transform(event, ctx) { event.x += 1; event }"
//!
//! [[destinations]]
//! id = "d1"
//! script = "fn execute(event, ctx, config) { console::log(event) }"
//! config = { endpoint = "https://example.invalid" }
//! ```

use crate::error::{ProcessorError, Result};
use crate::types::{Destination, Pipeline, Transformation};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Collection of metadata records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub pipelines: Vec<Pipeline>,
    pub transformations: Vec<Transformation>,
    pub destinations: Vec<Destination>,
}

impl Catalog {
    /// Load a catalog file; `.json` files are parsed as JSON, everything else as TOML
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProcessorError::Config(format!("Failed to read catalog {:?}: {}", path, e))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
        .map_err(|e| e.with_context(format!("Invalid catalog {:?}", path)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ProcessorError::Config(e.to_string()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| ProcessorError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
[[pipelines]]
id = "p1"
destinationId = "d1"
route = "web"
transformations = ["t1", "t2"]

[[transformations]]
id = "t1"
script = "fn transform(event) { event }"
version = 3

[[transformations]]
id = "t2"
script = "fn transform(event) { () }"
active = false

[[destinations]]
id = "d1"
script = "fn execute(event) {}"
config = { endpoint = "https://example.invalid", retries = 2 }
"#;

    #[test]
    fn test_parse_toml_catalog() {
        let catalog = Catalog::from_toml(CATALOG).unwrap();

        assert_eq!(catalog.pipelines.len(), 1);
        let pipeline = &catalog.pipelines[0];
        assert_eq!(pipeline.transformations, vec!["t1", "t2"]);
        assert_eq!(pipeline.route.as_deref(), Some("web"));

        assert_eq!(catalog.transformations[0].version, 3);
        assert!(catalog.transformations[0].active);
        assert!(!catalog.transformations[1].active);

        let config = &catalog.destinations[0].config;
        assert_eq!(config["retries"], 2);
        assert_eq!(config["endpoint"], "https://example.invalid");
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("catalog.toml");
        std::fs::write(&toml_path, CATALOG).unwrap();
        let from_toml = Catalog::load(&toml_path).unwrap();

        let json_path = dir.path().join("catalog.json");
        std::fs::write(&json_path, serde_json::to_string(&from_toml).unwrap()).unwrap();
        let from_json = Catalog::load(&json_path).unwrap();

        assert_eq!(from_toml, from_json);
    }

    #[test]
    fn test_invalid_catalog_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[[pipelines]]\nid = 5").unwrap();

        let err = Catalog::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}

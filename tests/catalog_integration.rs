//! Integration tests for catalog files, configuration and metadata updates

mod common;

use common::builders::{transformation, CatalogBuilder, DestinationBuilder, PipelineBuilder};
use common::mock_helpers::CountingStore;
use event_processor::config::Catalog;
use event_processor::metadata::InMemoryMetadataCache;
use event_processor::types::EntityKind;
use event_processor::{Event, EventBatchProcessor, PipelineResolver, ProcessorConfig};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const CATALOG_TOML: &str = r#"
[[pipelines]]
id = "orders"
destinationId = "warehouse"
transformations = ["normalize", "tag"]

[[transformations]]
id = "normalize"
version = 3
script = '''
fn transform(event) {
    event.amount = event.amount * 100;
    event
}
'''

[[transformations]]
id = "tag"
script = '''
fn transform(event, ctx) {
    ctx["tagged"] = true;
    event
}
'''

[[destinations]]
id = "warehouse"
script = '''
fn execute(event, ctx, config) {
    console::info(config.table, event.amount, ctx["tagged"]);
}
'''

[destinations.config]
table = "orders_v2"
"#;

fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_toml_catalog_end_to_end() {
    let file = write_temp(".toml", CATALOG_TOML);
    let catalog = Catalog::load(file.path()).unwrap();
    assert_eq!(catalog.transformations[0].version, 3);

    let processor = EventBatchProcessor::from_catalog(catalog, &ProcessorConfig::default());
    let results = processor
        .process_event_batch("orders", &[Event::new("o1", json!({"amount": 7}))])
        .await;

    assert!(results[0].success);
    assert_eq!(results[0].console_logs, "INFO: orders_v2 700 true");
}

#[tokio::test]
async fn test_json_catalog_end_to_end() {
    let catalog = CatalogBuilder::new()
        .pipeline(PipelineBuilder::new("p1").step("t1").build())
        .transformation(transformation(
            "t1",
            r#"fn transform(event) { console::warn("seen", event.kind); event }"#,
        ))
        .destination(DestinationBuilder::new("d1").build())
        .build();
    let file = write_temp(".json", &serde_json::to_string(&catalog).unwrap());

    let loaded = Catalog::load(file.path()).unwrap();
    assert_eq!(loaded, catalog);

    let results = EventBatchProcessor::from_catalog(loaded, &ProcessorConfig::default())
        .process_event_batch("p1", &[Event::new("e1", json!({"kind": "click"}))])
        .await;

    assert_eq!(results[0].console_logs, "WARN: seen click");
}

#[test]
fn test_invalid_catalog_names_the_file() {
    let file = write_temp(".toml", "[[pipelines]]\nid = 42\n");
    let err = Catalog::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("Invalid catalog"));
}

#[tokio::test]
async fn test_config_file_limits_apply_to_scripts() {
    let config_file = write_temp(
        ".toml",
        "[sandbox]\nmax_operations = 5000\n\n[cache]\nscript_cache_capacity = 8\n",
    );
    let config = ProcessorConfig::load(config_file.path()).unwrap();
    assert_eq!(config.sandbox.max_operations, 5000);

    let catalog = CatalogBuilder::new()
        .pipeline(PipelineBuilder::new("p1").step("busy").build())
        .transformation(transformation(
            "busy",
            "fn transform(event) { let n = 0; while n < 100000 { n += 1; } event }",
        ))
        .destination(DestinationBuilder::new("d1").build())
        .build();

    let strict = EventBatchProcessor::from_catalog(catalog.clone(), &config)
        .process_event_batch("p1", &[Event::new("e1", json!({}))])
        .await;
    assert!(!strict[0].success);

    let relaxed = EventBatchProcessor::from_catalog(catalog, &ProcessorConfig::default())
        .process_event_batch("p1", &[Event::new("e1", json!({}))])
        .await;
    assert!(relaxed[0].success);
}

#[tokio::test]
async fn test_edits_visible_after_invalidation() {
    let catalog = CatalogBuilder::new()
        .pipeline(PipelineBuilder::new("p1").step("t1").build())
        .transformation(transformation(
            "t1",
            r#"fn transform(event) { console::log("v1"); event }"#,
        ))
        .destination(DestinationBuilder::new("d1").build())
        .build();
    let store = Arc::new(CountingStore::new(catalog));
    let cache = Arc::new(InMemoryMetadataCache::new());
    let processor = EventBatchProcessor::new(
        PipelineResolver::new(store.clone(), cache.clone()),
        &ProcessorConfig::default(),
    );
    let events = [Event::new("e1", json!({}))];

    let before = processor.process_event_batch("p1", &events).await;
    assert_eq!(before[0].console_logs, "LOG: v1");

    store
        .inner()
        .upsert_transformation(transformation(
            "t1",
            r#"fn transform(event) { console::log("v2"); event }"#,
        ))
        .unwrap();

    // Cached copy still served until the record is evicted
    let stale = processor.process_event_batch("p1", &events).await;
    assert_eq!(stale[0].console_logs, "LOG: v1");

    cache.invalidate(EntityKind::Transformation, "t1").unwrap();
    let after = processor.process_event_batch("p1", &events).await;
    assert_eq!(after[0].console_logs, "LOG: v2");
    assert_eq!(store.transformation_queries(), 2);
}

#[tokio::test]
async fn test_deactivated_pipeline_after_invalidation() {
    let catalog = CatalogBuilder::new()
        .pipeline(PipelineBuilder::new("p1").build())
        .destination(DestinationBuilder::new("d1").build())
        .build();
    let store = Arc::new(CountingStore::new(catalog));
    let cache = Arc::new(InMemoryMetadataCache::new());
    let processor = EventBatchProcessor::new(
        PipelineResolver::new(store.clone(), cache.clone()),
        &ProcessorConfig::default(),
    );
    let events = [Event::new("e1", json!({}))];

    assert!(processor.process_event_batch("p1", &events).await[0].success);

    store
        .inner()
        .upsert_pipeline(PipelineBuilder::new("p1").inactive().build())
        .unwrap();
    cache.invalidate(EntityKind::Pipeline, "p1").unwrap();

    let results = processor.process_event_batch("p1", &events).await;
    assert_eq!(results[0].console_logs, "Pipeline is not active");
}

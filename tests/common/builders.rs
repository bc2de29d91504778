//! Test data builders for creating catalog records

use event_processor::{Catalog, Destination, Event, Pipeline, Transformation};
use serde_json::{json, Value};

/// Builder for creating test Pipelines
pub struct PipelineBuilder {
    pipeline: Pipeline,
}

impl PipelineBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            pipeline: Pipeline {
                id: id.to_string(),
                source_id: Some("src-1".to_string()),
                destination_id: "d1".to_string(),
                active: true,
                route: None,
                transformations: Vec::new(),
            },
        }
    }

    pub fn destination(mut self, id: &str) -> Self {
        self.pipeline.destination_id = id.to_string();
        self
    }

    pub fn step(mut self, id: &str) -> Self {
        self.pipeline.transformations.push(id.to_string());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.pipeline.active = false;
        self
    }

    pub fn build(self) -> Pipeline {
        self.pipeline
    }
}

/// Build an active transformation
pub fn transformation(id: &str, script: &str) -> Transformation {
    Transformation {
        id: id.to_string(),
        script: script.to_string(),
        version: 1,
        active: true,
    }
}

/// Build an inactive transformation
pub fn inactive_transformation(id: &str, script: &str) -> Transformation {
    Transformation {
        active: false,
        ..transformation(id, script)
    }
}

/// Builder for creating test Destinations
pub struct DestinationBuilder {
    destination: Destination,
}

impl DestinationBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            destination: Destination {
                id: id.to_string(),
                script: String::new(),
                version: 1,
                active: true,
                config: json!({}),
            },
        }
    }

    pub fn script(mut self, script: &str) -> Self {
        self.destination.script = script.to_string();
        self
    }

    pub fn config(mut self, config: Value) -> Self {
        self.destination.config = config;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.destination.active = false;
        self
    }

    pub fn build(self) -> Destination {
        self.destination
    }
}

/// Builder for assembling a catalog
#[derive(Default)]
pub struct CatalogBuilder {
    catalog: Catalog,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.catalog.pipelines.push(pipeline);
        self
    }

    pub fn transformation(mut self, transformation: Transformation) -> Self {
        self.catalog.transformations.push(transformation);
        self
    }

    pub fn destination(mut self, destination: Destination) -> Self {
        self.catalog.destinations.push(destination);
        self
    }

    pub fn build(self) -> Catalog {
        self.catalog
    }
}

/// Events `e1..=en` with payload `{"n": i}`
pub fn numbered_events(count: usize) -> Vec<Event> {
    (1..=count)
        .map(|i| Event::new(format!("e{}", i), json!({ "n": i })))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_builder() {
        let pipeline = PipelineBuilder::new("p1")
            .destination("d9")
            .step("t1")
            .step("t2")
            .inactive()
            .build();

        assert_eq!(pipeline.id, "p1");
        assert_eq!(pipeline.destination_id, "d9");
        assert_eq!(pipeline.transformations, vec!["t1", "t2"]);
        assert!(!pipeline.active);
    }
}

//! The declarative pipeline config carried in each job message.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use ingest_common::{IngestError, IngestResult};
use tiling::StageSpec;

/// Loader spec: where the granule lives and any stages to run before
/// the main processor list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GranuleSpec {
    /// Local path or object URI of the granule.
    pub resource: String,
    /// Stages prepended to the processor chain.
    #[serde(default)]
    pub preprocessors: Vec<StageSpec>,
}

/// Slicer spec: registry name plus per-dimension step sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicerSpec {
    pub name: String,
    #[serde(default)]
    pub steps: HashMap<String, u64>,
}

/// The full job document: `{granule, slicer, processors, dataset}`.
/// Parsed once per message; immutable once built into a `Pipeline`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub granule: GranuleSpec,
    pub slicer: SlicerSpec,
    pub processors: Vec<StageSpec>,
    /// Target dataset for tile summaries and ids.
    pub dataset: String,
}

impl PipelineConfig {
    /// Parse a job message body. Failures here are build-class errors:
    /// the message is rejected without requeue.
    pub fn from_json(body: &[u8]) -> IngestResult<Self> {
        let config: PipelineConfig = serde_json::from_slice(body)
            .map_err(|e| IngestError::Config(format!("unparsable job message: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> IngestResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn validate(&self) -> IngestResult<()> {
        if self.dataset.is_empty() {
            return Err(IngestError::Config("job message without dataset".to_string()));
        }
        if self.granule.resource.is_empty() {
            return Err(IngestError::Config(
                "job message without granule resource".to_string(),
            ));
        }
        if self.processors.is_empty() && self.granule.preprocessors.is_empty() {
            return Err(IngestError::Config(
                "job message without processors".to_string(),
            ));
        }
        Ok(())
    }

    /// The effective stage list: preprocessors first, then processors.
    pub fn stage_specs(&self) -> Vec<StageSpec> {
        let mut specs = self.granule.preprocessors.clone();
        specs.extend(self.processors.iter().cloned());
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> Vec<u8> {
        serde_json::json!({
            "granule": {"resource": "/data/avhrr/20260101.json"},
            "slicer": {"name": "by_step", "steps": {"lat": 180, "lon": 360}},
            "processors": [
                {"name": "read", "variable": "sst"},
                {"name": "filter_empty"},
                {"name": "summarize"}
            ],
            "dataset": "avhrr_oi"
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_parse_round_trip() {
        let config = PipelineConfig::from_json(&body()).unwrap();
        assert_eq!(config.dataset, "avhrr_oi");
        assert_eq!(config.slicer.steps["lat"], 180);
        assert_eq!(config.processors.len(), 3);

        let reparsed = PipelineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(reparsed.processors[0].name, "read");
    }

    #[test]
    fn test_unparsable_body_is_build_error() {
        let err = PipelineConfig::from_json(b"{not json").unwrap_err();
        assert!(err.is_build());
    }

    #[test]
    fn test_missing_dataset_rejected() {
        let body = serde_json::json!({
            "granule": {"resource": "/data/g.json"},
            "slicer": {"name": "by_step"},
            "processors": [{"name": "summarize"}],
            "dataset": ""
        })
        .to_string();
        assert!(PipelineConfig::from_json(body.as_bytes()).is_err());
    }

    #[test]
    fn test_preprocessors_run_first() {
        let body = serde_json::json!({
            "granule": {
                "resource": "/data/g.json",
                "preprocessors": [{"name": "read", "variable": "sst"}]
            },
            "slicer": {"name": "by_step"},
            "processors": [{"name": "summarize"}],
            "dataset": "ds"
        })
        .to_string();

        let config = PipelineConfig::from_json(body.as_bytes()).unwrap();
        let specs = config.stage_specs();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["read", "summarize"]);
    }
}

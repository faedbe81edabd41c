//! The producer: classify candidate granules, publish jobs, record
//! history.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, instrument};

use history::{GranuleStatus, HistoryManager};
use ingest_common::{Collection, Geometry, IngestResult};
use ingest_storage::JobPublisher;
use pipeline::{GranuleSpec, PipelineConfig, SlicerSpec};
use tiling::StageSpec;

use crate::scan::scan_granules;

/// Per-collection scan result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOutcome {
    pub published: usize,
    pub skipped: usize,
}

/// Renders one collection's pipeline config for one granule.
pub fn render_pipeline_config(collection: &Collection, granule: &Path) -> PipelineConfig {
    let mut read_params = serde_json::Map::new();
    if collection.variables.len() == 1 {
        read_params.insert("variable".to_string(), json!(collection.variables[0]));
    } else {
        read_params.insert("variables".to_string(), json!(collection.variables));
    }
    read_params.insert(
        "geometry".to_string(),
        json!(match collection.geometry {
            Geometry::Grid => "grid",
            Geometry::Swath => "swath",
            Geometry::TimeSeries => "time_series",
        }),
    );
    read_params.insert("latitude".to_string(), json!(collection.dimensions.latitude));
    read_params.insert(
        "longitude".to_string(),
        json!(collection.dimensions.longitude),
    );
    if let Some(time) = &collection.dimensions.time {
        read_params.insert("time".to_string(), json!(time));
    }

    PipelineConfig {
        granule: GranuleSpec {
            resource: granule.to_string_lossy().into_owned(),
            preprocessors: Vec::new(),
        },
        slicer: SlicerSpec {
            name: "by_step".to_string(),
            steps: collection.slices.clone(),
        },
        processors: vec![
            StageSpec::new("read", serde_json::Value::Object(read_params)),
            StageSpec::bare("filter_empty"),
            StageSpec::bare("summarize"),
        ],
        dataset: collection.dataset_id.clone(),
    }
}

/// Watches collections: for every candidate granule, classify against
/// the dataset's ingestion history, publish desired ones as job
/// messages, then record them as handled.
pub struct CollectionProcessor {
    publisher: Arc<dyn JobPublisher>,
    history: Arc<HistoryManager>,
}

impl CollectionProcessor {
    pub fn new(publisher: Arc<dyn JobPublisher>, history: Arc<HistoryManager>) -> Self {
        Self { publisher, history }
    }

    /// One scan pass over a collection's granule directory.
    ///
    /// History is recorded only after a successful publish; a crash
    /// between the two re-publishes on the next scan (at-least-once).
    #[instrument(skip(self, collection), fields(dataset = %collection.dataset_id))]
    pub async fn process_collection(&self, collection: &Collection) -> IngestResult<ProcessOutcome> {
        let granules = scan_granules(collection)?;
        let history = self.history.for_dataset(&collection.dataset_id).await?;

        let mut outcome = ProcessOutcome::default();
        for granule in granules {
            let status = history
                .classify(&granule, collection.date_from, collection.date_to)
                .await?;

            let priority = match status {
                GranuleStatus::DesiredForwardProcessing => collection.forward_priority(),
                GranuleStatus::DesiredHistorical => collection.historical_priority,
                GranuleStatus::Undesired => {
                    outcome.skipped += 1;
                    continue;
                }
            };

            let config = render_pipeline_config(collection, &granule);
            self.publisher.publish(&config.to_json()?, priority).await?;
            history.record(&granule).await?;

            debug!(granule = ?granule, priority = priority, "Published granule job");
            outcome.published += 1;
        }

        if outcome.published > 0 {
            info!(
                published = outcome.published,
                skipped = outcome.skipped,
                "Collection scan published jobs"
            );
        }
        Ok(outcome)
    }
}

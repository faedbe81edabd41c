//! The parallel pipeline executor.
//!
//! Tiles are processed on blocking worker threads bounded by
//! `max_concurrency`; results come back over a bounded channel so total
//! in-flight work stays capped no matter how many tiles a granule
//! yields. The first worker error cancels the pool and fails the run
//! before anything is written: a failed run writes no partial results.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use ingest_common::{Dataset, IngestError, IngestResult, Tile};
use ingest_storage::{DataStore, MetadataStore};
use tiling::{build_slicer, ProcessorChain, TileSlicer};

use crate::config::PipelineConfig;
use crate::loader::{build_loader, GranuleLoader};

/// Tiles per worker batch.
pub const TILE_BATCH_SIZE: usize = 256;

/// Ceiling on tiles in flight between submission and collection. A
/// backpressure valve against unbounded buffering, not a business rule.
pub const MAX_IN_FLIGHT_TILES: usize = (1 << 14) - 1;

enum TileOutcome {
    Processed(Box<Tile>),
    Dropped,
}

/// An immutable, fully resolved pipeline: loader, slicer, and chain are
/// all built (and validated) before any tile work starts.
pub struct Pipeline {
    dataset_name: String,
    loader: Box<dyn GranuleLoader>,
    slicer: Box<dyn TileSlicer>,
    chain: Arc<ProcessorChain>,
    max_concurrency: usize,
}

impl Pipeline {
    /// Build a pipeline from a parsed job config. Every error raised
    /// here is a build/config error and never reaches the worker pool.
    pub fn build(config: &PipelineConfig, max_concurrency: usize) -> IngestResult<Self> {
        if max_concurrency == 0 {
            return Err(IngestError::Config("max_concurrency must be positive".to_string()));
        }

        let loader = build_loader(&config.granule)?;
        let slicer = build_slicer(&config.slicer.name, config.slicer.steps.clone())?;
        let chain = Arc::new(ProcessorChain::build(&config.stage_specs())?);

        Ok(Self {
            dataset_name: config.dataset.clone(),
            loader,
            slicer,
            chain,
            max_concurrency,
        })
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    /// Execute the pipeline: open the granule, process every tile, and
    /// flush one batched write to each store. Returns the written count.
    #[instrument(skip_all, fields(dataset = %self.dataset_name))]
    pub async fn run(
        &self,
        data_store: Arc<dyn DataStore>,
        metadata_store: Arc<dyn MetadataStore>,
    ) -> IngestResult<usize> {
        // Scratch lives exactly as long as this run, on every exit path.
        let scratch = tempfile::TempDir::new()?;
        let (dataset, granule_name) = self.loader.open(scratch.path()).await?;

        let dims = dataset.dimensions();
        let specs = self.slicer.generate(&dims)?;
        let variables = self.chain.variables();

        let skeletons: Vec<Tile> = specs
            .into_iter()
            .map(|spec| Tile::skeleton(&self.dataset_name, &granule_name, spec, &variables))
            .collect();
        let total = skeletons.len();

        info!(granule = %granule_name, tiles = total, "Starting tile generation");

        let (processed, dropped) = self.process_tiles(skeletons, dataset).await?;
        let written = processed.len();

        // Flush only after the whole generation phase succeeded.
        data_store.save_batch(&processed).await?;
        metadata_store.save_batch(&processed).await?;

        info!(
            granule = %granule_name,
            written = written,
            dropped = dropped,
            "Completed granule ingestion"
        );
        Ok(written)
    }

    /// Fan tile batches out to the worker pool and collect results.
    /// Stops submitting on the first error, cancels outstanding workers,
    /// and surfaces that error.
    async fn process_tiles(
        &self,
        skeletons: Vec<Tile>,
        dataset: Arc<dyn Dataset>,
    ) -> IngestResult<(Vec<Tile>, usize)> {
        let batches: Vec<Vec<Tile>> = skeletons
            .chunks(TILE_BATCH_SIZE)
            .map(|c| c.to_vec())
            .collect();

        let channel_capacity = (MAX_IN_FLIGHT_TILES / TILE_BATCH_SIZE).max(1);
        let (tx, mut rx) = mpsc::channel::<IngestResult<Vec<TileOutcome>>>(channel_capacity);
        let cancel = CancellationToken::new();
        let permits = Arc::new(Semaphore::new(self.max_concurrency));

        let submitter = {
            let chain = self.chain.clone();
            let cancel = cancel.clone();
            let permits = permits.clone();
            tokio::spawn(async move {
                for batch in batches {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let Ok(permit) = permits.clone().acquire_owned().await else {
                        break;
                    };

                    let chain = chain.clone();
                    let dataset = dataset.clone();
                    let cancel = cancel.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let result = tokio::task::spawn_blocking(move || {
                            process_batch(&chain, dataset.as_ref(), batch, &cancel)
                        })
                        .await
                        .unwrap_or_else(|e| {
                            Err(IngestError::Processing(format!("tile worker panicked: {}", e)))
                        });

                        // Receiver gone means the run already failed.
                        let _ = tx.send(result).await;
                        drop(permit);
                    });
                }
                // Submitter's tx drops here; the channel closes once the
                // in-flight workers finish.
            })
        };

        let mut processed: Vec<Tile> = Vec::new();
        let mut dropped = 0usize;
        let mut failure: Option<IngestError> = None;

        while let Some(result) = rx.recv().await {
            match result {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        match outcome {
                            TileOutcome::Processed(tile) => processed.push(*tile),
                            TileOutcome::Dropped => dropped += 1,
                        }
                    }
                }
                Err(e) => {
                    if failure.is_none() {
                        warn!(error = %e, "Tile batch failed, cancelling run");
                        cancel.cancel();
                        failure = Some(e);
                    }
                }
            }
        }

        let _ = submitter.await;

        match failure {
            Some(e) => Err(e),
            None => {
                debug!(processed = processed.len(), dropped = dropped, "Tile generation complete");
                Ok((processed, dropped))
            }
        }
    }
}

/// Worker body: run the chain over one batch of tiles. Checks the cancel
/// token between tiles so a failing run winds down promptly.
fn process_batch(
    chain: &ProcessorChain,
    dataset: &dyn Dataset,
    batch: Vec<Tile>,
    cancel: &CancellationToken,
) -> IngestResult<Vec<TileOutcome>> {
    let mut outcomes = Vec::with_capacity(batch.len());
    for tile in batch {
        if cancel.is_cancelled() {
            break;
        }
        match chain.apply(tile, dataset)? {
            Some(done) => outcomes.push(TileOutcome::Processed(Box::new(done))),
            None => outcomes.push(TileOutcome::Dropped),
        }
    }
    Ok(outcomes)
}

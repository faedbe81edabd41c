//! Pipeline build and execution: from a job message to written tiles.
//!
//! A `PipelineConfig` (the queue message body) is parsed and resolved
//! against the slicer/stage registries once, producing an immutable
//! `Pipeline`. Running it opens the granule, slices it into tiles, fans
//! the tiles out to a bounded worker pool, and, only when every tile
//! succeeded, flushes one batched write to each store.

pub mod config;
pub mod executor;
pub mod loader;

pub use config::{GranuleSpec, PipelineConfig, SlicerSpec};
pub use executor::{Pipeline, MAX_IN_FLIGHT_TILES, TILE_BATCH_SIZE};
pub use loader::{build_loader, GranuleLoader, JsonGranuleLoader};

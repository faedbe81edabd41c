//! Shared types for the granule-tiler workspace.
//!
//! Provides the vocabulary the other crates speak:
//!
//! - Error type and result alias (`IngestError`, `IngestResult`)
//! - Collection declarations and their validation/diffing
//! - Granule signature schemes (content hash, mtime)
//! - Tile section specs, tiles, and deterministic tile ids
//! - The read-only `Dataset` interface granule readers expose

pub mod collection;
pub mod dataset;
pub mod error;
pub mod signature;
pub mod spec;
pub mod tile;

pub use collection::{Collection, CollectionSet, DimensionNames, Geometry};
pub use dataset::{ArrayDataset, Dataset, GranuleDocument};
pub use error::{IngestError, IngestResult};
pub use signature::{mtime_seconds, SignatureScheme};
pub use spec::{DimSlice, TileSpec};
pub use tile::{
    tile_id, BoundingBox, CoordBlock, GridPayload, NativeGridPayload, NumericBlock, Tile,
    TilePayload, TileStats, TileSummary, TimeSeriesPayload, SwathPayload, VariablePayload,
};

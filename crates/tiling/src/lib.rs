//! Tile partitioning and per-tile transform stages.
//!
//! `TileSlicer` turns a granule's dimensions into an ordered, exhaustive
//! tile-spec list; `ProcessorChain` runs the configured stages over each
//! tile, short-circuiting when a stage drops the tile. Both are built
//! from declarative specs against static name registries, so unknown
//! names fail at build time rather than inside the worker pool.

pub mod chain;
pub mod slicer;
pub mod stages;

pub use chain::{build_stage, ProcessorChain, StageSpec, TileStage};
pub use slicer::{build_slicer, StepSlicer, TileSlicer};

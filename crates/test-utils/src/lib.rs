//! Shared test utilities for the granule-tiler workspace.
//!
//! Provides:
//! - In-memory data/metadata stores and an in-memory job publisher
//! - Granule and dataset generators for the JSON granule format
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod granules;
pub mod memory;

pub use granules::{global_grid_dataset, write_granule};
pub use memory::{MemoryDataStore, MemoryMetadataStore, MemoryPublisher};

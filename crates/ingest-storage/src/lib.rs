//! Storage abstractions for the granule-tiler services.
//!
//! Provides unified interfaces for:
//! - Tile blob storage (MinIO/S3 or local filesystem) via `object_store`
//! - The PostgreSQL tile metadata/search store
//! - The durable Redis Streams priority job queue

pub mod data_store;
pub mod metadata_store;
pub mod queue;
pub mod retry;

pub use data_store::{DataStore, DataStoreConfig, ObjectDataStore};
pub use metadata_store::{MetadataStore, PostgresMetadataStore};
pub use queue::{JobMessage, JobPublisher, JobQueue, MAX_PRIORITY};
pub use retry::RetryPolicy;

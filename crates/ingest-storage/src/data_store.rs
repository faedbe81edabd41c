//! Tile blob storage over `object_store` (MinIO/S3 or local filesystem).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use ingest_common::{IngestError, IngestResult, Tile};

use crate::retry::RetryPolicy;

/// Concurrent puts per batch flush.
const PUT_CONCURRENCY: usize = 8;

/// Where tile blobs are written.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Verify the store is reachable. Failing this blocks startup.
    async fn health_check(&self) -> IngestResult<()>;

    /// Write a run's tiles in one batched flush (never per-tile from the
    /// executor).
    async fn save_batch(&self, tiles: &[Tile]) -> IngestResult<()>;

    /// Write one tile. Convenience over `save_batch`.
    async fn save_data(&self, tile: &Tile) -> IngestResult<()> {
        self.save_batch(std::slice::from_ref(tile)).await
    }
}

/// Backend selection for the tile blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataStoreConfig {
    /// S3/MinIO-compatible object storage.
    S3 {
        endpoint: String,
        bucket: String,
        access_key_id: String,
        secret_access_key: String,
        region: String,
        #[serde(default)]
        allow_http: bool,
    },
    /// Local directory, for development and tests.
    Local { root: PathBuf },
}

/// Object-store-backed tile data store. Tiles are serialized to JSON and
/// keyed `tiles/{dataset}/{tile_id}.json`.
pub struct ObjectDataStore {
    store: Arc<dyn ObjectStore>,
    label: String,
    retry: RetryPolicy,
}

impl ObjectDataStore {
    pub fn new(config: &DataStoreConfig, retry: RetryPolicy) -> IngestResult<Self> {
        let (store, label): (Arc<dyn ObjectStore>, String) = match config {
            DataStoreConfig::S3 {
                endpoint,
                bucket,
                access_key_id,
                secret_access_key,
                region,
                allow_http,
            } => {
                let mut builder = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_bucket_name(bucket)
                    .with_access_key_id(access_key_id)
                    .with_secret_access_key(secret_access_key)
                    .with_region(region);
                if *allow_http {
                    builder = builder.with_allow_http(true);
                }
                let store = builder.build().map_err(|e| {
                    IngestError::Storage(format!("failed to create S3 client: {}", e))
                })?;
                (Arc::new(store), format!("s3://{}", bucket))
            }
            DataStoreConfig::Local { root } => {
                std::fs::create_dir_all(root)?;
                let store = LocalFileSystem::new_with_prefix(root).map_err(|e| {
                    IngestError::Storage(format!("failed to open local store: {}", e))
                })?;
                (Arc::new(store), format!("file://{}", root.display()))
            }
        };

        Ok(Self {
            store,
            label,
            retry,
        })
    }

    /// Storage key for one tile blob.
    pub fn tile_path(tile: &Tile) -> String {
        format!(
            "tiles/{}/{}.json",
            tile.summary.dataset_name, tile.summary.tile_id
        )
    }
}

#[async_trait]
impl DataStore for ObjectDataStore {
    async fn health_check(&self) -> IngestResult<()> {
        // A missing probe object still proves the store is reachable.
        let probe = Path::from(".health");
        match self.store.head(&probe).await {
            Ok(_) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(IngestError::connection("data store", e)),
        }
    }

    #[instrument(skip(self, tiles), fields(store = %self.label, tiles = tiles.len()))]
    async fn save_batch(&self, tiles: &[Tile]) -> IngestResult<()> {
        let mut blobs = Vec::with_capacity(tiles.len());
        for tile in tiles {
            let body = serde_json::to_vec(tile)?;
            blobs.push((Path::from(Self::tile_path(tile)), Bytes::from(body)));
        }

        let results: Vec<IngestResult<()>> = stream::iter(blobs)
            .map(|(location, body)| {
                let store = self.store.clone();
                let retry = self.retry;
                async move {
                    retry
                        .run("data store", || {
                            let store = store.clone();
                            let location = location.clone();
                            let body = body.clone();
                            async move {
                                store.put(&location, body.into()).await.map_err(|e| {
                                    IngestError::Storage(format!(
                                        "failed to write {}: {}",
                                        location, e
                                    ))
                                })?;
                                Ok(())
                            }
                        })
                        .await
                }
            })
            .buffer_unordered(PUT_CONCURRENCY)
            .collect()
            .await;

        for result in results {
            result?;
        }

        debug!("Wrote tile batch");
        Ok(())
    }
}

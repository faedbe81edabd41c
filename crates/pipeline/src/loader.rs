//! Granule loaders: opening a resource into a read-only dataset.
//!
//! Remote resources are fetched to a run-scoped scratch directory before
//! parsing; the executor owns the scratch lifetime and releases it on
//! every exit path. Format-specific readers (NetCDF, HDF) plug in here
//! by implementing `GranuleLoader` for their extensions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;
use tracing::debug;

use ingest_common::{Dataset, GranuleDocument, IngestError, IngestResult};

use crate::config::GranuleSpec;

/// Opens one granule resource into a shared read-only dataset plus its
/// canonical name (the resource basename).
#[async_trait]
pub trait GranuleLoader: Send + Sync {
    async fn open(&self, scratch: &Path) -> IngestResult<(Arc<dyn Dataset>, String)>;
}

/// Loader for the self-describing JSON granule format.
pub struct JsonGranuleLoader {
    resource: String,
}

impl JsonGranuleLoader {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
        }
    }

    /// Resolve the resource to a local file, fetching object-store URIs
    /// into the scratch directory.
    async fn localize(&self, scratch: &Path) -> IngestResult<PathBuf> {
        if let Some(remainder) = self.resource.strip_prefix("s3://") {
            let (bucket, key) = remainder.split_once('/').ok_or_else(|| {
                IngestError::Granule(format!("malformed object URI '{}'", self.resource))
            })?;

            let store = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| IngestError::Granule(format!("object store client: {}", e)))?;

            let location = object_store::path::Path::from(key);
            let result = store
                .get(&location)
                .await
                .map_err(|e| IngestError::Granule(format!("fetch {} failed: {}", self.resource, e)))?;
            let body = result
                .bytes()
                .await
                .map_err(|e| IngestError::Granule(format!("fetch {} failed: {}", self.resource, e)))?;

            let name = basename(key);
            let local = scratch.join(&name);
            tokio::fs::write(&local, &body).await?;
            debug!(resource = %self.resource, bytes = body.len(), "Fetched granule to scratch");
            return Ok(local);
        }

        let path = self.resource.strip_prefix("file://").unwrap_or(&self.resource);
        Ok(PathBuf::from(path))
    }
}

#[async_trait]
impl GranuleLoader for JsonGranuleLoader {
    async fn open(&self, scratch: &Path) -> IngestResult<(Arc<dyn Dataset>, String)> {
        let local = self.localize(scratch).await?;
        let name = basename(&local.to_string_lossy());

        let body = tokio::fs::read(&local)
            .await
            .map_err(|e| IngestError::Granule(format!("unreadable granule {:?}: {}", local, e)))?;
        let document: GranuleDocument = serde_json::from_slice(&body)
            .map_err(|e| IngestError::Granule(format!("malformed granule {:?}: {}", local, e)))?;
        let dataset = document.into_dataset()?;

        Ok((Arc::new(dataset), name))
    }
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Resolve a loader for a granule spec by resource extension. Unknown
/// formats are build errors.
pub fn build_loader(spec: &GranuleSpec) -> IngestResult<Box<dyn GranuleLoader>> {
    let resource = spec.resource.as_str();
    if resource.ends_with(".json") {
        Ok(Box::new(JsonGranuleLoader::new(resource)))
    } else {
        Err(IngestError::Config(format!(
            "no loader for granule resource '{}'",
            resource
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_common::ArrayDataset;

    fn write_granule(dir: &Path) -> PathBuf {
        let dataset = ArrayDataset::new(vec![("lat".to_string(), 2), ("lon".to_string(), 2)])
            .with_variable("lat", &["lat"], vec![-45.0, 45.0])
            .unwrap()
            .with_variable("lon", &["lon"], vec![0.0, 180.0])
            .unwrap()
            .with_variable("sst", &["lat", "lon"], vec![280.0, 281.0, 282.0, 283.0])
            .unwrap();

        let path = dir.join("20260101120000.json");
        let doc = GranuleDocument::from_dataset(&dataset);
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_open_local_granule() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_granule(dir.path());

        let loader = JsonGranuleLoader::new(path.to_string_lossy());
        let scratch = tempfile::tempdir().unwrap();
        let (dataset, name) = loader.open(scratch.path()).await.unwrap();

        assert_eq!(name, "20260101120000.json");
        assert_eq!(
            dataset.dimensions(),
            vec![("lat".to_string(), 2), ("lon".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_missing_granule_is_execution_error() {
        let loader = JsonGranuleLoader::new("/nonexistent/g.json");
        let scratch = tempfile::tempdir().unwrap();
        let err = loader.open(scratch.path()).await.err().unwrap();
        assert!(err.is_execution());
    }

    #[tokio::test]
    async fn test_malformed_granule_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{not a granule").unwrap();

        let loader = JsonGranuleLoader::new(path.to_string_lossy());
        let scratch = tempfile::tempdir().unwrap();
        let err = loader.open(scratch.path()).await.err().unwrap();
        assert!(err.is_execution());
    }

    #[test]
    fn test_registry_rejects_unknown_format() {
        let spec = GranuleSpec {
            resource: "/data/g.nc4".to_string(),
            preprocessors: Vec::new(),
        };
        let err = build_loader(&spec).err().unwrap();
        assert!(err.is_build());
    }
}

//! Ingestion history: the per-dataset ledger that decides whether a
//! granule is worth processing.
//!
//! The classification logic lives in [`IngestionHistory`]; durable storage
//! is behind the [`HistoryStore`] trait with two backends:
//!
//! - a per-dataset append-only file ledger plus a high-water-mark sidecar
//! - a PostgreSQL document table keyed by a stable granule fingerprint
//!
//! One instance per dataset id per process window; the [`HistoryManager`]
//! owns the instances and flushes them at shutdown.

mod file;
mod postgres;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ingest_common::{mtime_seconds, IngestResult, SignatureScheme};

pub use file::FileHistoryStore;
pub use postgres::PostgresHistoryStore;

/// Whether a candidate granule should be ingested, and in which class.
/// Computed on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GranuleStatus {
    /// Newer than anything ingested for the dataset: always wanted.
    DesiredForwardProcessing,
    /// Inside the backfill window and not yet ingested in this form.
    DesiredHistorical,
    /// Already ingested, or outside the backfill window.
    Undesired,
}

/// Durable storage behind one dataset's ingestion history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Most recently recorded signature for a granule basename.
    async fn lookup(&self, file_name: &str) -> IngestResult<Option<String>>;

    /// Record a granule signature, durably, before returning.
    async fn push(&self, file_name: &str, signature: &str) -> IngestResult<()>;

    /// The dataset's high-water-mark mtime (float UNIX seconds).
    async fn latest_mtime(&self) -> IngestResult<Option<f64>>;

    /// Persist a new high-water-mark, durably, before returning.
    async fn push_latest_mtime(&self, seconds: f64) -> IngestResult<()>;

    /// Flush and compact at teardown.
    async fn close(&self) -> IngestResult<()>;
}

/// Per-dataset ingestion history. Not safe for multiple concurrent
/// writers on the same dataset id; ownership is one instance per
/// dataset id per process window.
pub struct IngestionHistory {
    dataset_id: String,
    scheme: SignatureScheme,
    store: Box<dyn HistoryStore>,
}

impl IngestionHistory {
    pub fn new(
        dataset_id: impl Into<String>,
        scheme: SignatureScheme,
        store: Box<dyn HistoryStore>,
    ) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            scheme,
            store,
        }
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    /// Classify a candidate granule against the ledger.
    ///
    /// A file newer than the high-water-mark is always
    /// `DesiredForwardProcessing`, even outside an explicit date window:
    /// freshly-arriving data is always wanted.
    pub async fn classify(
        &self,
        path: &Path,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> IngestResult<GranuleStatus> {
        let mtime = mtime_seconds(path)?;

        match self.store.latest_mtime().await? {
            None => return Ok(GranuleStatus::DesiredForwardProcessing),
            Some(hwm) if mtime > hwm => return Ok(GranuleStatus::DesiredForwardProcessing),
            Some(_) => {}
        }

        // Both bounds strict; a missing bound does not constrain.
        let after_from = date_from.map_or(true, |d| mtime > d.timestamp() as f64);
        let before_to = date_to.map_or(true, |d| mtime < d.timestamp() as f64);
        if !(after_from && before_to) {
            return Ok(GranuleStatus::Undesired);
        }

        let signature = self.scheme.compute(path)?;
        let stored = self.store.lookup(&basename(path)).await?;
        if stored.as_deref() == Some(signature.as_str()) {
            Ok(GranuleStatus::Undesired)
        } else {
            Ok(GranuleStatus::DesiredHistorical)
        }
    }

    /// Record a granule as handled: persist its signature, then raise the
    /// high-water-mark if its mtime exceeds it. Both writes are durable
    /// before this returns.
    pub async fn record(&self, path: &Path) -> IngestResult<()> {
        let signature = self.scheme.compute(path)?;
        let name = basename(path);
        self.store.push(&name, &signature).await?;

        let mtime = mtime_seconds(path)?;
        let hwm = self.store.latest_mtime().await?.unwrap_or(f64::MIN);
        if mtime > hwm {
            self.store.push_latest_mtime(mtime).await?;
        }

        debug!(
            dataset = %self.dataset_id,
            granule = %name,
            "Recorded granule in ingestion history"
        );
        Ok(())
    }

    pub async fn close(&self) -> IngestResult<()> {
        self.store.close().await
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Which backend the process uses for ingestion history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryConfig {
    /// Append-only ledgers under a directory, one per dataset.
    File { dir: PathBuf },
    /// PostgreSQL document table shared by all datasets.
    Postgres { url: String },
}

/// Owns the per-dataset history instances for one process: lazily
/// created, cached, flushed together at shutdown.
pub struct HistoryManager {
    config: HistoryConfig,
    scheme: SignatureScheme,
    instances: tokio::sync::Mutex<HashMap<String, Arc<IngestionHistory>>>,
}

impl HistoryManager {
    pub fn new(config: HistoryConfig, scheme: SignatureScheme) -> Self {
        Self {
            config,
            scheme,
            instances: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The history for a dataset, creating and caching it on first use.
    /// Backend construction failures (including an unreachable document
    /// store) are fatal to the caller.
    pub async fn for_dataset(&self, dataset_id: &str) -> IngestResult<Arc<IngestionHistory>> {
        let mut instances = self.instances.lock().await;
        if let Some(existing) = instances.get(dataset_id) {
            return Ok(existing.clone());
        }

        let store: Box<dyn HistoryStore> = match &self.config {
            HistoryConfig::File { dir } => {
                Box::new(FileHistoryStore::open(dir, dataset_id).await?)
            }
            HistoryConfig::Postgres { url } => {
                Box::new(PostgresHistoryStore::connect(url, dataset_id).await?)
            }
        };

        let history = Arc::new(IngestionHistory::new(dataset_id, self.scheme, store));
        instances.insert(dataset_id.to_string(), history.clone());
        Ok(history)
    }

    /// Flush and compact every cached history. Called at process shutdown.
    pub async fn close_all(&self) -> IngestResult<()> {
        let mut instances = self.instances.lock().await;
        for (dataset_id, history) in instances.drain() {
            if let Err(e) = history.close().await {
                tracing::warn!(dataset = %dataset_id, error = %e, "History close failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn write_granule(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn set_mtime(path: &Path, secs_ago: u64) {
        let t = SystemTime::now() - Duration::from_secs(secs_ago);
        let file = std::fs::File::options().append(true).open(path).unwrap();
        file.set_modified(t).unwrap();
    }

    async fn history(dir: &Path) -> IngestionHistory {
        let store = FileHistoryStore::open(&dir.join("history"), "avhrr_oi")
            .await
            .unwrap();
        IngestionHistory::new("avhrr_oi", SignatureScheme::Sha256, Box::new(store))
    }

    #[tokio::test]
    async fn test_unknown_dataset_is_forward_processing() {
        let dir = tempfile::tempdir().unwrap();
        let granule = write_granule(dir.path(), "g1.json", b"data");

        let h = history(dir.path()).await;
        let status = h.classify(&granule, None, None).await.unwrap();
        assert_eq!(status, GranuleStatus::DesiredForwardProcessing);
    }

    #[tokio::test]
    async fn test_newer_than_high_water_mark_overrides_date_window() {
        let dir = tempfile::tempdir().unwrap();
        let old = write_granule(dir.path(), "old.json", b"old");
        set_mtime(&old, 3600);

        let h = history(dir.path()).await;
        h.record(&old).await.unwrap();

        // Fresh file, but the window is entirely in the past.
        let fresh = write_granule(dir.path(), "fresh.json", b"fresh");
        let from = Utc::now() - chrono::Duration::days(30);
        let to = Utc::now() - chrono::Duration::days(20);

        let status = h.classify(&fresh, Some(from), Some(to)).await.unwrap();
        assert_eq!(status, GranuleStatus::DesiredForwardProcessing);
    }

    #[tokio::test]
    async fn test_in_window_unseen_is_historical() {
        let dir = tempfile::tempdir().unwrap();
        let newest = write_granule(dir.path(), "newest.json", b"newest");

        let h = history(dir.path()).await;
        h.record(&newest).await.unwrap();

        let backfill = write_granule(dir.path(), "backfill.json", b"backfill");
        set_mtime(&backfill, 3600);

        let from = Utc::now() - chrono::Duration::days(1);
        let to = Utc::now() + chrono::Duration::days(1);
        let status = h.classify(&backfill, Some(from), Some(to)).await.unwrap();
        assert_eq!(status, GranuleStatus::DesiredHistorical);
    }

    #[tokio::test]
    async fn test_recorded_unchanged_granule_is_undesired() {
        let dir = tempfile::tempdir().unwrap();
        let granule = write_granule(dir.path(), "g1.json", b"data");

        let h = history(dir.path()).await;
        h.record(&granule).await.unwrap();

        let status = h.classify(&granule, None, None).await.unwrap();
        assert_eq!(status, GranuleStatus::Undesired);
    }

    #[tokio::test]
    async fn test_changed_content_in_window_is_historical() {
        let dir = tempfile::tempdir().unwrap();
        let granule = write_granule(dir.path(), "g1.json", b"v1");

        let h = history(dir.path()).await;
        h.record(&granule).await.unwrap();

        // Rewrite in place, then age it back below the high-water-mark.
        std::fs::write(&granule, b"v2").unwrap();
        set_mtime(&granule, 3600);

        let newest = write_granule(dir.path(), "newest.json", b"newest");
        h.record(&newest).await.unwrap();

        let status = h.classify(&granule, None, None).await.unwrap();
        assert_eq!(status, GranuleStatus::DesiredHistorical);
    }

    #[tokio::test]
    async fn test_outside_window_is_undesired() {
        let dir = tempfile::tempdir().unwrap();
        let h = history(dir.path()).await;

        let newest = write_granule(dir.path(), "newest.json", b"newest");
        h.record(&newest).await.unwrap();

        let stale = write_granule(dir.path(), "stale.json", b"stale");
        set_mtime(&stale, 3600);

        let from = Utc::now() + chrono::Duration::days(1);
        let status = h.classify(&stale, Some(from), None).await.unwrap();
        assert_eq!(status, GranuleStatus::Undesired);
    }

    #[tokio::test]
    async fn test_manager_caches_instances() {
        let dir = tempfile::tempdir().unwrap();
        let manager = HistoryManager::new(
            HistoryConfig::File {
                dir: dir.path().join("history"),
            },
            SignatureScheme::Sha256,
        );

        let a = manager.for_dataset("avhrr_oi").await.unwrap();
        let b = manager.for_dataset("avhrr_oi").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        manager.close_all().await.unwrap();
    }
}

//! File-backed ingestion history: an append-only per-dataset ledger of
//! `filename,signature` lines plus a sidecar high-water-mark file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use ingest_common::{IngestError, IngestResult};

use crate::HistoryStore;

struct Inner {
    /// Latest signature per basename; later ledger lines win.
    entries: HashMap<String, String>,
    latest_mtime: Option<f64>,
    ledger: File,
}

/// Append-only ledger store. Records are fsynced as they are pushed; the
/// ledger is compacted down to one line per filename at close.
pub struct FileHistoryStore {
    ledger_path: PathBuf,
    mtime_path: PathBuf,
    inner: Mutex<Inner>,
}

impl FileHistoryStore {
    /// Open (creating if needed) the ledger for one dataset under the
    /// history directory.
    pub async fn open(dir: &Path, dataset_id: &str) -> IngestResult<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let ledger_path = dir.join(format!("{}.history", dataset_id));
        let mtime_path = dir.join(format!("{}.mtime", dataset_id));

        let mut entries = HashMap::new();
        if let Ok(content) = tokio::fs::read_to_string(&ledger_path).await {
            for line in content.lines().filter(|l| !l.is_empty()) {
                if let Some((name, signature)) = line.split_once(',') {
                    entries.insert(name.to_string(), signature.to_string());
                }
            }
        }

        let latest_mtime = match tokio::fs::read_to_string(&mtime_path).await {
            Ok(text) => {
                let value = text.trim().parse::<f64>().map_err(|_| {
                    IngestError::History(format!(
                        "corrupt high-water-mark file {:?}: '{}'",
                        mtime_path,
                        text.trim()
                    ))
                })?;
                Some(value)
            }
            Err(_) => None,
        };

        let ledger = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&ledger_path)
            .await?;

        debug!(
            dataset = %dataset_id,
            entries = entries.len(),
            "Opened ingestion history ledger"
        );

        Ok(Self {
            ledger_path,
            mtime_path,
            inner: Mutex::new(Inner {
                entries,
                latest_mtime,
                ledger,
            }),
        })
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn lookup(&self, file_name: &str) -> IngestResult<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.entries.get(file_name).cloned())
    }

    async fn push(&self, file_name: &str, signature: &str) -> IngestResult<()> {
        let mut inner = self.inner.lock().await;

        let line = format!("{},{}\n", file_name, signature);
        inner.ledger.write_all(line.as_bytes()).await?;
        inner.ledger.flush().await?;
        inner.ledger.sync_all().await?;

        inner
            .entries
            .insert(file_name.to_string(), signature.to_string());
        Ok(())
    }

    async fn latest_mtime(&self) -> IngestResult<Option<f64>> {
        let inner = self.inner.lock().await;
        Ok(inner.latest_mtime)
    }

    async fn push_latest_mtime(&self, seconds: f64) -> IngestResult<()> {
        let mut inner = self.inner.lock().await;

        // Write-then-rename keeps the sidecar atomic against crashes.
        let tmp = self.mtime_path.with_extension("mtime.tmp");
        let mut file = File::create(&tmp).await?;
        file.write_all(format!("{:.6}\n", seconds).as_bytes())
            .await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, &self.mtime_path).await?;

        inner.latest_mtime = Some(seconds);
        Ok(())
    }

    async fn close(&self) -> IngestResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ledger.flush().await?;
        inner.ledger.sync_all().await?;

        // Compact: scan in reverse keeping the most-recent record per
        // filename, write survivors to a temp file, atomically replace.
        let content = tokio::fs::read_to_string(&self.ledger_path).await?;
        let mut seen = std::collections::HashSet::new();
        let mut survivors = Vec::new();
        for line in content.lines().rev().filter(|l| !l.is_empty()) {
            let Some((name, _)) = line.split_once(',') else {
                continue;
            };
            if seen.insert(name.to_string()) {
                survivors.push(line);
            }
        }

        let tmp = self.ledger_path.with_extension("history.tmp");
        let mut file = File::create(&tmp).await?;
        for line in &survivors {
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        file.sync_all().await?;
        tokio::fs::rename(&tmp, &self.ledger_path).await?;

        debug!(
            ledger = ?self.ledger_path,
            records = survivors.len(),
            "Compacted ingestion history ledger"
        );
        Ok(())
    }
}

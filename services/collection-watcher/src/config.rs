//! Watcher configuration.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use history::HistoryConfig;
use ingest_common::SignatureScheme;

fn default_scan_interval_secs() -> u64 {
    30
}

/// Top-level watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Redis URL for the job queue
    pub redis_url: String,

    /// Path to the collections declaration document
    pub collections_path: PathBuf,

    /// Ingestion history backend
    pub history: HistoryConfig,

    /// Granule signature scheme
    #[serde(default)]
    pub signature: SignatureScheme,

    /// Seconds between directory scans (and declaration reload checks)
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
}

impl WatcherConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading watcher config {}", path))?;
        serde_yaml::from_str(&content).with_context(|| format!("parsing watcher config {}", path))
    }

    /// Load configuration from environment variables (container default).
    pub fn from_env() -> Result<Self> {
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://redis:6379".to_string());
        let collections_path = env::var("COLLECTIONS_PATH")
            .unwrap_or_else(|_| "/etc/granule-tiler/collections.yaml".to_string())
            .into();

        let history = match env::var("HISTORY_URL") {
            Ok(url) => HistoryConfig::Postgres { url },
            Err(_) => HistoryConfig::File {
                dir: env::var("HISTORY_DIR")
                    .unwrap_or_else(|_| "/var/lib/granule-tiler/history".to_string())
                    .into(),
            },
        };

        let scan_interval_secs = env::var("SCAN_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_scan_interval_secs);

        Ok(Self {
            redis_url,
            collections_path,
            history,
            signature: SignatureScheme::default(),
            scan_interval_secs,
        })
    }
}

//! Collection watcher service.
//!
//! Periodically scans each declared collection's granule location,
//! classifies candidates against the per-dataset ingestion history, and
//! publishes tile-generation jobs to the durable priority queue.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use collection_watcher::{load_declarations, CollectionProcessor, WatcherConfig};
use history::HistoryManager;
use ingest_common::CollectionSet;
use ingest_storage::JobQueue;

#[derive(Parser, Debug)]
#[command(name = "collection-watcher")]
#[command(about = "Granule collection watcher and job producer")]
struct Args {
    /// Configuration file path (environment variables when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single scan pass and exit (vs continuous watching)
    #[arg(long)]
    once: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .json()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting collection watcher");

    let config = match &args.config {
        Some(path) => WatcherConfig::from_yaml(path)?,
        None => WatcherConfig::from_env()?,
    };

    let queue = JobQueue::connect(&config.redis_url, "collection-watcher")
        .await
        .context("connecting job queue")?;
    queue.ping().await.context("queue probe failed")?;

    let history = Arc::new(HistoryManager::new(
        config.history.clone(),
        config.signature,
    ));
    let processor = CollectionProcessor::new(Arc::new(queue), history.clone());

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                shutdown.cancel();
            }
        });
    }

    let mut active = CollectionSet::default();
    let mut declarations_mtime = None;
    let interval = Duration::from_secs(config.scan_interval_secs);

    loop {
        // Reload the declarations when the document changed; the active
        // set is replaced wholesale and additions are logged.
        match std::fs::metadata(&config.collections_path).and_then(|m| m.modified()) {
            Ok(modified) if declarations_mtime != Some(modified) => {
                match load_declarations(&config.collections_path) {
                    Ok(set) => {
                        for added in set.added_since(&active) {
                            info!(dataset = %added.dataset_id, "Watching collection");
                        }
                        active = set;
                        declarations_mtime = Some(modified);
                    }
                    Err(e) => {
                        error!(error = %e, "Collections reload failed, keeping previous set")
                    }
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Collections document unreadable"),
        }

        for collection in active.collections() {
            if let Err(e) = processor.process_collection(collection).await {
                error!(
                    dataset = %collection.dataset_id,
                    error = %e,
                    "Collection scan failed"
                );
            }
        }

        if args.once {
            break;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    // Flush and compact every history ledger before exiting.
    history.close_all().await.ok();
    info!("Watcher stopped");
    Ok(())
}

//! Granule ingestion worker.
//!
//! Pulls tile-generation jobs from the durable priority queue, runs each
//! pipeline to completion, and settles the message from the outcome.

mod config;
mod consumer;
mod server;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use ingest_storage::{JobQueue, ObjectDataStore, PostgresMetadataStore};

use config::WorkerConfig;
use consumer::QueueConsumer;

#[derive(Parser, Debug)]
#[command(name = "ingest-worker")]
#[command(about = "Granule ingestion worker for the tile store")]
struct Args {
    /// Configuration file path (environment variables when omitted)
    #[arg(short, long)]
    config: Option<String>,

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

    info!("Starting granule ingestion worker");

    let config = match &args.config {
        Some(path) => WorkerConfig::from_yaml(path)?,
        None => WorkerConfig::from_env()?,
    };

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;

    let consumer_name = format!("worker-{}", Uuid::new_v4());
    let queue = JobQueue::connect(&config.redis_url, &consumer_name)
        .await
        .context("connecting job queue")?;
    match queue.depth().await {
        Ok(backlog) => info!(backlog = backlog, "Connected to job queue"),
        Err(e) => info!(error = %e, "Connected to job queue, depth unavailable"),
    }
    let data_store = Arc::new(ObjectDataStore::new(&config.data_store, config.retry)?);
    let metadata_store = Arc::new(
        PostgresMetadataStore::connect(&config.database_url, config.retry)
            .await
            .context("connecting metadata store")?,
    );

    let consumer = QueueConsumer::new(
        queue,
        data_store,
        metadata_store,
        config.max_concurrency,
        Duration::from_secs(config.poll_interval_secs),
    );

    // Any failed probe blocks startup entirely.
    consumer
        .probe_dependencies()
        .await
        .context("dependency probe failed")?;
    info!(consumer = %consumer_name, "All dependency probes passed");

    tokio::spawn(server::start_server(metrics_handle, config.http_port));

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

    if let Err(e) = consumer.run(shutdown).await {
        error!(error = %e, "Consumer terminated on lost dependency");
        return Err(e.into());
    }

    info!("Worker stopped");
    Ok(())
}

//! The queue consumer: one message fully handled (parse, build, run,
//! settle) before the next is fetched.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ingest_common::{IngestError, IngestResult};
use ingest_storage::{DataStore, JobMessage, JobQueue, MetadataStore};
use pipeline::{Pipeline, PipelineConfig};

/// How a handled message is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    Ack,
    Reject { requeue: bool },
    /// No settle at all: the consumer is presumed compromised and the
    /// broker's redelivery covers the message.
    Fatal,
}

/// Map a handling outcome to its settle action.
///
/// - build errors: the config cannot self-heal; reject, no requeue
/// - execution errors: poison-message containment; reject, no requeue
/// - connection errors: propagate unhandled, no ack/reject
/// - anything else: assumed transient; reject with requeue
pub fn disposition(result: &IngestResult<usize>) -> Settle {
    match result {
        Ok(_) => Settle::Ack,
        Err(e) if e.is_connection() => Settle::Fatal,
        Err(e) if e.is_build() || e.is_execution() => Settle::Reject { requeue: false },
        Err(_) => Settle::Reject { requeue: true },
    }
}

/// Pulls one job at a time from the queue and runs it to completion.
pub struct QueueConsumer {
    queue: JobQueue,
    data_store: Arc<dyn DataStore>,
    metadata_store: Arc<dyn MetadataStore>,
    max_concurrency: usize,
    poll_interval: Duration,
}

impl QueueConsumer {
    pub fn new(
        queue: JobQueue,
        data_store: Arc<dyn DataStore>,
        metadata_store: Arc<dyn MetadataStore>,
        max_concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            data_store,
            metadata_store,
            max_concurrency,
            poll_interval,
        }
    }

    /// Probe every dependency. Any failure blocks startup entirely.
    pub async fn probe_dependencies(&self) -> IngestResult<()> {
        self.queue.ping().await?;
        self.data_store.health_check().await?;
        self.metadata_store.health_check().await?;
        Ok(())
    }

    /// Consume until shutdown. Returns an error only for lost-connection
    /// failures, which are allowed to take the process down.
    pub async fn run(&self, shutdown: CancellationToken) -> IngestResult<()> {
        info!("Consumer started");
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping message intake");
                    return Ok(());
                }
                message = self.queue.next(self.poll_interval) => message?,
            };

            self.handle_message(message).await?;
        }
    }

    async fn handle_message(&self, message: JobMessage) -> IngestResult<()> {
        counter!("ingest_jobs_received_total").increment(1);
        info!(
            entry = %message.entry_id,
            priority = message.priority,
            "Handling job message"
        );

        let result = self.process(&message).await;

        match disposition(&result) {
            Settle::Ack => {
                let written = result.unwrap_or(0);
                counter!("ingest_jobs_succeeded_total").increment(1);
                counter!("ingest_tiles_written_total").increment(written as u64);
                self.queue.ack(&message).await?;
            }
            Settle::Reject { requeue } => {
                let e = result.unwrap_err();
                warn!(
                    entry = %message.entry_id,
                    requeue = requeue,
                    error = %e,
                    "Job failed, rejecting"
                );
                counter!("ingest_jobs_failed_total").increment(1);
                self.queue.reject(&message, requeue).await?;
            }
            Settle::Fatal => {
                let e = result.unwrap_err();
                error!(
                    entry = %message.entry_id,
                    error = %e,
                    "Lost a dependency mid-run; leaving message for redelivery"
                );
                return Err(e);
            }
        }

        Ok(())
    }

    async fn process(&self, message: &JobMessage) -> IngestResult<usize> {
        let config = PipelineConfig::from_json(&message.body)?;
        let pipeline = Pipeline::build(&config, self.max_concurrency)?;
        info!(
            dataset = %pipeline.dataset_name(),
            granule = %config.granule.resource,
            "Running pipeline"
        );
        pipeline
            .run(self.data_store.clone(), self.metadata_store.clone())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_acks() {
        assert_eq!(disposition(&Ok(12)), Settle::Ack);
    }

    #[test]
    fn test_build_error_rejects_without_requeue() {
        let result = Err(IngestError::Config("unknown stage".into()));
        assert_eq!(disposition(&result), Settle::Reject { requeue: false });
    }

    #[test]
    fn test_execution_error_rejects_without_requeue() {
        let result = Err(IngestError::Granule("unreadable".into()));
        assert_eq!(disposition(&result), Settle::Reject { requeue: false });
    }

    #[test]
    fn test_connection_error_is_fatal_and_unsettled() {
        let result = Err(IngestError::connection("metadata store", "gone"));
        assert_eq!(disposition(&result), Settle::Fatal);
    }

    #[test]
    fn test_unexpected_error_rejects_with_requeue() {
        let result = Err(IngestError::Io(std::io::Error::other("scratch full")));
        assert_eq!(disposition(&result), Settle::Reject { requeue: true });
    }
}

//! Bounded exponential backoff for store writes.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use ingest_common::{IngestError, IngestResult};

/// Retry budget for a dependency write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << attempt.min(16)))
    }

    /// Run `op` until it succeeds or the budget is exhausted. Exhaustion
    /// converts the last error to a fatal lost-connection error for the
    /// named service.
    pub async fn run<T, F, Fut>(&self, service: &str, mut op: F) -> IngestResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = IngestResult<T>>,
    {
        let mut last: Option<IngestError> = None;

        for attempt in 0..self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        service = %service,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Store write failed, backing off"
                    );
                    last = Some(e);
                }
            }

            if attempt + 1 < self.max_attempts {
                tokio::time::sleep(self.delay(attempt)).await;
            }
        }

        let message = last
            .map(|e| e.to_string())
            .unwrap_or_else(|| "retries exhausted".to_string());
        Err(IngestError::connection(service, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = fast_policy()
            .run("metadata store", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(IngestError::Metadata("timeout".to_string()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_becomes_connection_error() {
        let result: IngestResult<()> = fast_policy()
            .run("data store", || async {
                Err(IngestError::Storage("refused".to_string()))
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_connection());
        assert!(err.to_string().contains("data store"));
    }
}

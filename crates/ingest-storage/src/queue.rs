//! Durable priority job queue on Redis Streams.
//!
//! One stream per priority level, all owned by a single consumer group.
//! Consumers read COUNT=1 from the highest-priority non-empty stream, so
//! exactly one message is in flight per consumer (prefetch=1), higher
//! priorities are served first, and arrival order breaks ties. Unacked
//! entries stay pending and are reclaimed after their consumer goes
//! quiet, which is what makes a crashed worker lose no acknowledged work.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use tracing::{debug, warn};

use ingest_common::{IngestError, IngestResult};

/// Highest queue priority. Priorities are clamped to `0..=MAX_PRIORITY`
/// at publish time.
pub const MAX_PRIORITY: u8 = 9;

const STREAM_PREFIX: &str = "ingest:jobs";
const DEAD_LETTER_KEY: &str = "ingest:jobs:dead";
const CONSUMER_GROUP: &str = "ingest-workers";

/// Pending entries idle longer than this are treated as abandoned by a
/// dead consumer and redelivered.
const REDELIVERY_IDLE_MS: u64 = 30_000;

fn stream_key(priority: u8) -> String {
    format!("{}:p{}", STREAM_PREFIX, priority)
}

fn clamp_priority(priority: u8) -> u8 {
    priority.min(MAX_PRIORITY)
}

fn queue_err(e: redis::RedisError) -> IngestError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        IngestError::connection("queue", e)
    } else {
        IngestError::Queue(e.to_string())
    }
}

/// The publish half of the queue contract, so producers can be exercised
/// without a broker.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Publish a job message at the given priority (clamped to
    /// `0..=MAX_PRIORITY`). Returns the broker entry id.
    async fn publish(&self, body: &[u8], priority: u8) -> IngestResult<String>;
}

/// One job message as delivered to a consumer.
#[derive(Debug, Clone)]
pub struct JobMessage {
    pub stream: String,
    pub entry_id: String,
    pub priority: u8,
    pub body: Bytes,
}

/// Redis Streams job queue.
pub struct JobQueue {
    conn: MultiplexedConnection,
    consumer_name: String,
}

impl JobQueue {
    /// Connect and ensure the consumer group exists on every priority
    /// stream. Groups start at `0` so messages published before any
    /// consumer attached are still delivered.
    pub async fn connect(redis_url: &str, consumer_name: &str) -> IngestResult<Self> {
        let client = Client::open(redis_url).map_err(queue_err)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(queue_err)?;

        for priority in 0..=MAX_PRIORITY {
            // BUSYGROUP on re-create is expected and ignored.
            let _: Result<(), _> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(stream_key(priority))
                .arg(CONSUMER_GROUP)
                .arg("0")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;
        }

        Ok(Self {
            conn,
            consumer_name: consumer_name.to_string(),
        })
    }

    /// Verify the broker is reachable.
    pub async fn ping(&self) -> IngestResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;
        Ok(())
    }

    fn message_from_entry(
        &self,
        stream: &str,
        priority: u8,
        entry: &StreamId,
    ) -> IngestResult<Option<JobMessage>> {
        let Some(value) = entry.map.get("data") else {
            warn!(stream = %stream, entry = %entry.id, "Queue entry without data field");
            return Ok(None);
        };
        let body: Vec<u8> = redis::from_redis_value(value)
            .map_err(|e| IngestError::Queue(format!("undecodable queue entry: {}", e)))?;

        Ok(Some(JobMessage {
            stream: stream.to_string(),
            entry_id: entry.id.clone(),
            priority,
            body: Bytes::from(body),
        }))
    }

    async fn read_new(&self, priority: u8) -> IngestResult<Option<JobMessage>> {
        let mut conn = self.conn.clone();
        let key = stream_key(priority);
        let opts = StreamReadOptions::default()
            .group(CONSUMER_GROUP, &self.consumer_name)
            .count(1);

        let reply: StreamReadReply = conn
            .xread_options(&[key.as_str()], &[">"], &opts)
            .await
            .map_err(queue_err)?;

        for stream in reply.keys {
            for entry in stream.ids {
                if let Some(msg) = self.message_from_entry(&key, priority, &entry)? {
                    return Ok(Some(msg));
                }
            }
        }
        Ok(None)
    }

    /// Claim one entry abandoned by a consumer that stopped acking.
    async fn reclaim(&self, priority: u8) -> IngestResult<Option<JobMessage>> {
        let mut conn = self.conn.clone();
        let key = stream_key(priority);

        let reply: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&key)
            .arg(CONSUMER_GROUP)
            .arg(&self.consumer_name)
            .arg(REDELIVERY_IDLE_MS)
            .arg("0-0")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;

        for entry in &reply.claimed {
            if let Some(msg) = self.message_from_entry(&key, priority, entry)? {
                debug!(stream = %key, entry = %msg.entry_id, "Reclaimed abandoned job");
                return Ok(Some(msg));
            }
        }
        Ok(None)
    }

    /// Fetch at most one message: new messages first, highest priority
    /// first, then abandoned pending entries.
    pub async fn fetch_one(&self) -> IngestResult<Option<JobMessage>> {
        for priority in (0..=MAX_PRIORITY).rev() {
            if let Some(msg) = self.read_new(priority).await? {
                return Ok(Some(msg));
            }
        }
        for priority in (0..=MAX_PRIORITY).rev() {
            if let Some(msg) = self.reclaim(priority).await? {
                return Ok(Some(msg));
            }
        }
        Ok(None)
    }

    /// Block until a message is available.
    pub async fn next(&self, poll_interval: Duration) -> IngestResult<JobMessage> {
        loop {
            if let Some(msg) = self.fetch_one().await? {
                return Ok(msg);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Acknowledge a handled message.
    pub async fn ack(&self, msg: &JobMessage) -> IngestResult<()> {
        let mut conn = self.conn.clone();
        let _: u64 = conn
            .xack(&msg.stream, CONSUMER_GROUP, &[&msg.entry_id])
            .await
            .map_err(queue_err)?;
        Ok(())
    }

    /// Reject a message. With `requeue` it returns to the tail of its
    /// priority stream; without, it is copied to the dead-letter stream
    /// for inspection. Either way the original entry is acked.
    pub async fn reject(&self, msg: &JobMessage, requeue: bool) -> IngestResult<()> {
        let mut conn = self.conn.clone();

        if requeue {
            let _: String = conn
                .xadd(&msg.stream, "*", &[("data", msg.body.as_ref())])
                .await
                .map_err(queue_err)?;
        } else {
            let fields: [(&str, &[u8]); 3] = [
                ("data", msg.body.as_ref()),
                ("origin", msg.stream.as_bytes()),
                ("entry", msg.entry_id.as_bytes()),
            ];
            let _: String = conn
                .xadd(DEAD_LETTER_KEY, "*", &fields)
                .await
                .map_err(queue_err)?;
        }

        self.ack(msg).await
    }

    /// Total queued (not yet delivered or still pending) messages.
    pub async fn depth(&self) -> IngestResult<u64> {
        let mut conn = self.conn.clone();
        let mut total = 0u64;
        for priority in 0..=MAX_PRIORITY {
            let len: u64 = conn.xlen(stream_key(priority)).await.map_err(queue_err)?;
            total += len;
        }
        Ok(total)
    }
}

#[async_trait]
impl JobPublisher for JobQueue {
    async fn publish(&self, body: &[u8], priority: u8) -> IngestResult<String> {
        let mut conn = self.conn.clone();
        let key = stream_key(clamp_priority(priority));
        let entry_id: String = conn
            .xadd(&key, "*", &[("data", body)])
            .await
            .map_err(queue_err)?;

        debug!(stream = %key, entry = %entry_id, "Published job");
        Ok(entry_id)
    }
}

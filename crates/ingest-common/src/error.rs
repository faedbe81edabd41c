//! Error types for the granule-tiler workspace.

use thiserror::Error;

/// Result type alias using IngestError.
pub type IngestResult<T> = Result<T, IngestError>;

/// Primary error type for ingestion operations.
#[derive(Debug, Error)]
pub enum IngestError {
    // === Build/configuration errors (never reach the worker pool) ===
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid collection: {0}")]
    Collection(String),

    // === Execution errors (raised while processing a granule) ===
    #[error("Failed to read granule: {0}")]
    Granule(String),

    #[error("Tile processing failed: {0}")]
    Processing(String),

    // === Dependency errors ===
    #[error("Data store error: {0}")]
    Storage(String),

    #[error("Metadata store error: {0}")]
    Metadata(String),

    #[error("History store error: {0}")]
    History(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Lost connection to {service}: {message}")]
    Connection { service: String, message: String },

    // === Infrastructure errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl IngestError {
    /// Build a lost-connection error for a named dependency.
    pub fn connection(service: impl Into<String>, message: impl ToString) -> Self {
        IngestError::Connection {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// True for errors that mean a dependency is gone, not that the
    /// current input is bad. These are the only errors allowed to take
    /// the consumer process down.
    pub fn is_connection(&self) -> bool {
        matches!(self, IngestError::Connection { .. })
    }

    /// True for errors raised while building a pipeline from its config.
    /// A bad config cannot self-heal, so these are never retried.
    pub fn is_build(&self) -> bool {
        matches!(self, IngestError::Config(_) | IngestError::Collection(_))
    }

    /// True for errors raised while executing a pipeline over a granule.
    pub fn is_execution(&self) -> bool {
        matches!(self, IngestError::Granule(_) | IngestError::Processing(_))
    }
}

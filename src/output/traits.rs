//! Record sink trait and output errors

use crate::extract::Record;
use thiserror::Error;

/// Errors that can occur while writing records
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for extracted records
///
/// The sink owns format and durability. Implementations must be
/// thread-safe; the coordinator emits from a single task but sinks are
/// shared behind an `Arc`.
pub trait RecordSink: Send + Sync {
    /// Writes one record
    ///
    /// # Arguments
    ///
    /// * `record` - The product or review to store
    fn emit(&self, record: &Record) -> OutputResult<()>;

    /// Flushes buffered output; called once when the crawl ends
    fn finalize(&self) -> OutputResult<()>;
}

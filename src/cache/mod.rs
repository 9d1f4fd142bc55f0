//! Response cache
//!
//! Fetched responses are persisted under the same fingerprint the frontier
//! deduplicates on, so a re-run serves every previously fetched page from
//! disk. Entries never expire.

mod filesystem;

pub use filesystem::FilesystemCache;

use crate::crawler::{FetchRequest, Response};
use async_trait::async_trait;
use thiserror::Error;

/// Cache-specific errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Corrupt cache entry {fingerprint}: {reason}")]
    Corrupt { fingerprint: String, reason: String },
}

/// Result type alias for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Persistent store of responses keyed by request fingerprint
///
/// Requests flagged `dont_cache` bypass both lookups and writes.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Looks up a stored response for the request
    async fn get(&self, request: &FetchRequest) -> CacheResult<Option<Response>>;

    /// Stores a response, returning whether anything was written
    async fn put(&self, request: &FetchRequest, response: &Response) -> CacheResult<bool>;
}

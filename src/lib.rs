//! steam-scraper: a storefront crawler for product metadata and user reviews
//!
//! This crate crawls the Steam store and community site, classifying each
//! response (age gate, paginated review batch, terminal product page),
//! synthesizing follow-up requests with typed context, and deduplicating and
//! caching requests under a fingerprint that ignores the `snr` tracking
//! parameter. A separate sharding tool splits review URLs for parallel runs.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod robots;
pub mod shard;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid link pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Sharding error: {0}")]
    Shard(#[from] shard::ShardError),

    #[error("Failed to read seed file {path}: {source}")]
    SeedFile {
        path: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Callback, ContextBag, Coordinator, FetchRequest, Response, Spider};
pub use extract::{ProductRecord, Record, ReviewRecord};
pub use url::{fingerprint, normalize_url, strip_tracking, Fingerprint};

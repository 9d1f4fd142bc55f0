//! Configuration module for steam-scraper
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; a missing file section falls back to defaults that
//! mirror a polite single-process crawl of the store.
//!
//! # Example
//!
//! ```no_run
//! use steam_scraper::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Concurrency: {}", config.crawler.max_concurrent_requests);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AutoThrottleConfig, CacheConfig, Config, CrawlerConfig, OutputConfig, OutputFormat,
    RobotsConfig, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, validate_domain_pattern};

//! Output module: record sinks and crawl statistics
//!
//! This module handles:
//! - Writing extracted records as JSON lines or into SQLite
//! - Counting what happened during a crawl and printing a summary

mod jsonl;
mod sqlite_output;
pub mod stats;
mod traits;

pub use jsonl::JsonLinesSink;
pub use sqlite_output::SqliteSink;
pub use stats::{print_statistics, CrawlStats, Counter, StatsSnapshot};
pub use traits::{OutputError, OutputResult, RecordSink};

use crate::config::{OutputConfig, OutputFormat};
use std::path::Path;
use std::sync::Arc;

/// Opens the sink selected by the `[output]` section
///
/// # Arguments
///
/// * `config` - Output settings
/// * `path` - Overrides `config.path` when given
pub fn open_sink(config: &OutputConfig, path: Option<&Path>) -> OutputResult<Arc<dyn RecordSink>> {
    let path = path.unwrap_or_else(|| Path::new(&config.path));

    let sink: Arc<dyn RecordSink> = match config.format {
        OutputFormat::Jsonl => Arc::new(JsonLinesSink::create(path)?),
        OutputFormat::Sqlite => Arc::new(SqliteSink::new(path)?),
    };
    tracing::debug!("Writing {:?} output to {}", config.format, path.display());
    Ok(sink)
}

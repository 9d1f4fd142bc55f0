//! Review URL sharding
//!
//! Splits the review URLs of scraped products into roughly equal files so
//! several review crawls can run side by side, each on its own file.

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default number of shard files
pub const DEFAULT_PIECES: usize = 10;

/// Errors raised by the sharding tool
#[derive(Debug, Error)]
pub enum ShardError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid JSON on line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("Number of pieces must be at least 1")]
    NoPieces,
}

/// What a sharding run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardReport {
    /// Shard files in index order
    pub files: Vec<PathBuf>,

    /// Distinct review URLs written
    pub urls: usize,

    /// Sum of `n_reviews` over retained rows; an upper bound on reviews to scrape
    pub review_upper_bound: u64,
}

/// Review URLs and review total of the rows worth crawling
///
/// A row is kept when `id`, `reviews_url` and `title` are present and not
/// null and `n_reviews` is greater than zero. URLs are deduplicated keeping
/// the first occurrence; the review total counts every kept row.
pub fn select_review_urls(rows: &[Value]) -> (Vec<String>, u64) {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    let mut total = 0u64;

    for row in rows {
        let present = |key: &str| row.get(key).map_or(false, |v| !v.is_null());
        if !(present("id") && present("reviews_url") && present("title")) {
            continue;
        }

        let n_reviews = row.get("n_reviews").and_then(Value::as_f64).unwrap_or(0.0);
        if n_reviews <= 0.0 {
            continue;
        }
        total += n_reviews as u64;

        let url = match row.get("reviews_url") {
            Some(Value::String(url)) => url.clone(),
            Some(other) => other.to_string(),
            None => continue,
        };
        if seen.insert(url.clone()) {
            urls.push(url);
        }
    }

    (urls, total)
}

/// URLs per shard: `ceil(n / pieces)`
pub fn shard_step(n: usize, pieces: usize) -> usize {
    if pieces == 0 {
        return n;
    }
    (n + pieces - 1) / pieces
}

/// Reads product rows from a JSON-lines file, skipping blank lines
pub fn read_product_rows(path: &Path) -> Result<Vec<Value>, ShardError> {
    let content = fs::read_to_string(path).map_err(|source| ShardError::Read {
        path: path.display().to_string(),
        source,
    })?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| ShardError::Json { line: i + 1, source })
        })
        .collect()
}

/// Shuffles review URLs and writes them to `review_urls_NN.txt` files
///
/// Shards hold `ceil(n / pieces)` URLs each, the last one possibly fewer,
/// so fewer than `pieces` files can come out. Files are numbered from 01
/// and their lines are joined by `\n` without a trailing newline.
///
/// # Arguments
///
/// * `products` - JSON-lines file of scraped products
/// * `output_dir` - Directory for the shard files (created if missing)
/// * `pieces` - Requested number of shards
/// * `rng` - Source of randomness for the shuffle
pub fn split_review_urls<R: Rng + ?Sized>(
    products: &Path,
    output_dir: &Path,
    pieces: usize,
    rng: &mut R,
) -> Result<ShardReport, ShardError> {
    if pieces == 0 {
        return Err(ShardError::NoPieces);
    }

    let rows = read_product_rows(products)?;
    let (mut urls, review_upper_bound) = select_review_urls(&rows);
    urls.shuffle(rng);

    let write_error = |path: &Path, source: std::io::Error| ShardError::Write {
        path: path.display().to_string(),
        source,
    };
    fs::create_dir_all(output_dir).map_err(|e| write_error(output_dir, e))?;

    let step = shard_step(urls.len(), pieces);
    let mut files = Vec::new();

    if step > 0 {
        for (index, chunk) in urls.chunks(step).enumerate() {
            let path = output_dir.join(format!("review_urls_{:02}.txt", index + 1));
            fs::write(&path, chunk.join("\n")).map_err(|e| write_error(&path, e))?;
            files.push(path);
        }
    }

    tracing::info!(
        "Wrote {} review URLs into {} files under {}",
        urls.len(),
        files.len(),
        output_dir.display()
    );

    Ok(ShardReport {
        files,
        urls: urls.len(),
        review_upper_bound,
    })
}

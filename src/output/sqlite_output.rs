//! SQLite sink
//!
//! Records land in a `products` or a `reviews` table. Each row keeps a few
//! key columns for querying plus the full record as JSON.

use crate::extract::Record;
use crate::output::traits::{OutputError, OutputResult, RecordSink};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQL schema for the items database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_id TEXT,
    url TEXT NOT NULL,
    title TEXT,
    n_reviews INTEGER,
    data TEXT NOT NULL,
    scraped_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_products_app_id ON products(app_id);

CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id TEXT,
    page INTEGER,
    page_order INTEGER NOT NULL,
    user_id TEXT,
    recommended INTEGER,
    data TEXT NOT NULL,
    scraped_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reviews_product ON reviews(product_id);
"#;

/// Sink writing records into a SQLite database
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> OutputResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> OutputResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| OutputError::Write(format!("Failed to lock database: {}", e)))
    }

    /// Number of rows in `products` and `reviews`
    pub fn counts(&self) -> OutputResult<(u64, u64)> {
        let conn = self.lock()?;
        let products: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        let reviews: i64 = conn.query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))?;
        Ok((products as u64, reviews as u64))
    }
}

impl RecordSink for SqliteSink {
    fn emit(&self, record: &Record) -> OutputResult<()> {
        let data = serde_json::to_string(record)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;

        match record {
            Record::Product(product) => {
                conn.execute(
                    "INSERT INTO products (app_id, url, title, n_reviews, data, scraped_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        product.id,
                        product.url,
                        product.title,
                        product.n_reviews.map(|n| n as i64),
                        data,
                        now
                    ],
                )?;
            }
            Record::Review(review) => {
                conn.execute(
                    "INSERT INTO reviews (product_id, page, page_order, user_id, recommended, data, scraped_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        review.product_id,
                        review.page,
                        review.page_order as i64,
                        review.user_id,
                        review.recommended,
                        data,
                        now
                    ],
                )?;
            }
        }

        Ok(())
    }

    fn finalize(&self) -> OutputResult<()> {
        let (products, reviews) = self.counts()?;
        tracing::info!("Database holds {} products and {} reviews", products, reviews);
        Ok(())
    }
}

//! JSON-lines sink: one UTF-8 JSON object per line

use crate::extract::Record;
use crate::output::traits::{OutputError, OutputResult, RecordSink};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Appends records to a `.jl` file
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it and its parent directory
    ///
    /// # Arguments
    ///
    /// * `path` - Output file
    pub fn create(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonLinesSink {
    fn emit(&self, record: &Record) -> OutputResult<()> {
        let line = serde_json::to_string(record)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| OutputError::Write(format!("Failed to lock writer: {}", e)))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn finalize(&self) -> OutputResult<()> {
        self.writer
            .lock()
            .map_err(|e| OutputError::Write(format!("Failed to lock writer: {}", e)))?
            .flush()?;
        tracing::info!("Items written to {}", self.path.display());
        Ok(())
    }
}

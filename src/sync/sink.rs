//! NDJSON snapshot writers.
//!
//! Two snapshot files are kept per run: the raw records exactly as paginated
//! from the source, and the enriched records with their image lists. Each
//! writer truncates its file at open by removing and recreating it, then
//! appends one JSON value per line through a buffered async writer.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use crate::infrastructure::config::OutputConfig;
use crate::sync::error::SinkError;

/// Append-only NDJSON writer over a freshly truncated file.
pub struct NdjsonWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
}

impl NdjsonWriter {
    /// Open `path` for a new run. Any previous snapshot is removed first so
    /// a run that produces zero records still leaves an empty file, never a
    /// stale one.
    pub async fn create(path: &Path) -> Result<Self, SinkError> {
        match fs::remove_file(path).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(SinkError::new(path, error)),
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|error| SinkError::new(path, error))?;
            }
        }
        let file = File::create(path)
            .await
            .map_err(|error| SinkError::new(path, error))?;
        Ok(Self { path: path.to_path_buf(), writer: BufWriter::new(file), lines: 0 })
    }

    /// Serialize one value and append it as a single line.
    pub async fn write_value<T: Serialize>(&mut self, value: &T) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(value)
            .map_err(|error| SinkError::new(&self.path, std::io::Error::other(error)))?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(|error| SinkError::new(&self.path, error))?;
        self.lines += 1;
        Ok(())
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Flush buffered lines and close. Must be called before the snapshot is
    /// read back.
    pub async fn close(mut self) -> Result<(), SinkError> {
        self.writer
            .flush()
            .await
            .map_err(|error| SinkError::new(&self.path, error))?;
        info!(path = %self.path.display(), lines = self.lines, "Snapshot closed");
        Ok(())
    }
}

/// The pair of snapshot writers one run maintains.
pub struct DualSink {
    pub raw: NdjsonWriter,
    pub enriched: NdjsonWriter,
}

impl DualSink {
    pub async fn open(output: &OutputConfig) -> Result<Self, SinkError> {
        let raw = NdjsonWriter::create(&output.raw_path).await?;
        let enriched = NdjsonWriter::create(&output.enriched_path).await?;
        Ok(Self { raw, enriched })
    }

    pub async fn write_raw<T: Serialize>(&mut self, value: &T) -> Result<(), SinkError> {
        self.raw.write_value(value).await
    }

    pub async fn write_enriched<T: Serialize>(&mut self, value: &T) -> Result<(), SinkError> {
        self.enriched.write_value(value).await
    }

    pub async fn close(self) -> Result<(), SinkError> {
        self.raw.close().await?;
        self.enriched.close().await?;
        Ok(())
    }
}

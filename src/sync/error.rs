//! Error taxonomy of the pipeline's I/O boundaries.
//!
//! Each error is caught at its own granularity (page, record, batch, line)
//! and converted into a counter or skip decision; none of them propagate to
//! the caller as an unhandled fault. Only sink open/close failures are
//! run-fatal.

use std::path::PathBuf;
use thiserror::Error;

use crate::infrastructure::http::HttpError;

/// Source page unreachable after exhausting retries.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source page returned HTTP {status}")]
    Status { status: u16 },
    #[error("source page request timed out")]
    Timeout,
    #[error("source page network error: {0}")]
    Network(String),
    #[error("unexpected source page payload: {0}")]
    InvalidResponse(String),
}

impl From<HttpError> for FetchError {
    fn from(error: HttpError) -> Self {
        match error {
            HttpError::Status { status, .. } => FetchError::Status { status },
            HttpError::Timeout { .. } => FetchError::Timeout,
            HttpError::Network { message, .. } => FetchError::Network(message),
            HttpError::InvalidBody { message, .. } => FetchError::InvalidResponse(message),
        }
    }
}

/// Per-record image retrieval exhausted retries or hit the hard deadline.
#[derive(Debug, Error)]
pub enum ImageFetchError {
    #[error("image endpoint returned HTTP {status}")]
    Status { status: u16 },
    #[error("image request timed out")]
    Timeout,
    #[error("image endpoint network error: {0}")]
    Network(String),
    #[error("unexpected image payload: {0}")]
    InvalidResponse(String),
}

impl ImageFetchError {
    /// Overload signals nudge concurrency down and feed the breaker window.
    pub fn is_overload(&self) -> bool {
        matches!(
            self,
            ImageFetchError::Timeout | ImageFetchError::Status { status: 408 }
        )
    }
}

impl From<HttpError> for ImageFetchError {
    fn from(error: HttpError) -> Self {
        match error {
            HttpError::Status { status, .. } => ImageFetchError::Status { status },
            HttpError::Timeout { .. } => ImageFetchError::Timeout,
            HttpError::Network { message, .. } => ImageFetchError::Network(message),
            HttpError::InvalidBody { message, .. } => ImageFetchError::InvalidResponse(message),
        }
    }
}

/// Destination rejected a batch after exhausting retries.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("destination returned HTTP {status}")]
    Status { status: u16 },
    #[error("destination request timed out")]
    Timeout,
    #[error("destination network error: {0}")]
    Network(String),
}

impl From<HttpError> for DeliveryError {
    fn from(error: HttpError) -> Self {
        match error {
            HttpError::Status { status, .. } => DeliveryError::Status { status },
            HttpError::Timeout { .. } => DeliveryError::Timeout,
            HttpError::Network { message, .. } | HttpError::InvalidBody { message, .. } => {
                DeliveryError::Network(message)
            }
        }
    }
}

/// Malformed persisted line encountered during snapshot replay.
#[derive(Debug, Error)]
#[error("malformed snapshot line {line}: {source}")]
pub struct ParseError {
    /// 1-based line number.
    pub line: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Snapshot sink failure. Open/close variants are run-fatal.
#[derive(Debug, Error)]
#[error("snapshot sink error on {path:?}: {source}")]
pub struct SinkError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl SinkError {
    pub fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self { path: path.into(), source }
    }
}

//! Error types for rangeseal-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Invalid range: start {start} > end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("Invalid timestamp: {0} is before the Unix epoch")]
    InvalidTimestamp(i64),

    #[error("Invalid time: {0}")]
    InvalidTime(String),

    #[error("Invalid document id: {0}")]
    InvalidDocumentId(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),
}

/// Failure talking to the remote store.
///
/// A non-success status and a transport failure are both surfaced to the
/// caller; neither is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("store rejected request: {0}")]
    Status(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

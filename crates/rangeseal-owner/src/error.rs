//! Owner error types

use rangeseal_core::{Field, RemoteError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OwnerError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Cannot compile access policy {label:?}: {reason}")]
    PolicyCompile { label: String, reason: String },

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Attribute key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Access denied: attribute key does not satisfy the ciphertext policy")]
    AccessDenied,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Partition {requested:?} is not covered by the credential for {delegated:?}")]
    PartitionNotDelegated { requested: String, delegated: String },

    #[error("Index error: {0}")]
    Index(String),

    #[error(transparent)]
    Core(#[from] rangeseal_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why one matched document could not be decrypted
///
/// Reported per document so one bad document never hides the rest of a
/// result set, and never turns into an empty value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("access denied for field {0}")]
    AccessDenied(Field),

    #[error("malformed document: {0}")]
    Decode(String),
}

impl From<DocumentError> for OwnerError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::AccessDenied(_) => OwnerError::AccessDenied,
            DocumentError::Decode(msg) => OwnerError::Decode(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, OwnerError>;

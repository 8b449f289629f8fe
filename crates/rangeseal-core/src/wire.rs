//! Remote store wire messages
//!
//! Three synchronous request/response operations:
//! - Insert: documents plus update tags, all-or-nothing
//! - Find: search trapdoors plus requested field names, returns documents
//! - PreFind: search trapdoors, returns the subset that matches anything
//!
//! Every response carries a `status` that is [`STATUS_OK`] on success and
//! an error message otherwise.

use serde::{Deserialize, Serialize};

use crate::record::{DocumentId, Field, Token};
use crate::RemoteError;

/// Success marker carried in `status`
pub const STATUS_OK: &str = "Ok";

/// Opaque ciphertext blob of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentBlob {
    pub id: DocumentId,
    #[serde(with = "crate::hex_serde::bytes")]
    pub binary: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertRequest {
    pub documents: Vec<DocumentBlob>,
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindRequest {
    pub fields: Vec<Field>,
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindResponse {
    pub status: String,
    #[serde(default)]
    pub documents: Vec<DocumentBlob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreFindRequest {
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreFindResponse {
    pub status: String,
    #[serde(default)]
    pub tokens: Vec<Token>,
}

/// Map a response status to `Ok(())` or [`RemoteError::Status`]
pub fn check_status(status: &str) -> Result<(), RemoteError> {
    if status == STATUS_OK {
        Ok(())
    } else {
        Err(RemoteError::Status(status.to_string()))
    }
}

impl InsertResponse {
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK.to_string(),
        }
    }
}

impl FindResponse {
    pub fn ok(documents: Vec<DocumentBlob>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            documents,
        }
    }
}

impl PreFindResponse {
    pub fn ok(tokens: Vec<Token>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            tokens,
        }
    }
}

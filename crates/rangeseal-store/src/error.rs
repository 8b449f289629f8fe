//! Store error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use rangeseal_core::DocumentId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Duplicate index address")]
    DuplicateAddress,

    #[error("Duplicate document id {0}")]
    DuplicateDocument(DocumentId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::InvalidToken(_) | StoreError::InvalidDocument(_) => StatusCode::BAD_REQUEST,
            StoreError::DuplicateAddress | StoreError::DuplicateDocument(_) => StatusCode::CONFLICT,
            StoreError::Io(_) | StoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "status": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

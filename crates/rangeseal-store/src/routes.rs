//! HTTP routes for the store

use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::get,
    routing::post,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use rangeseal_core::wire::{
    FindRequest, FindResponse, InsertRequest, InsertResponse, PreFindRequest, PreFindResponse,
};

use crate::error::Result;
use crate::metrics::{self, OP_FIND, OP_INSERT, OP_PREFIND};
use crate::state::{SharedState, StoreStats};

/// Largest request body accepted, in bytes
///
/// An inserted record costs about 15 KiB of JSON (128 update tags and four
/// ciphertexts), so this admits batches of roughly 30 000 records.
pub const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: StoreStats,
}

fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => metrics::OUTCOME_OK,
        Err(e) if e.status_code().is_client_error() => metrics::OUTCOME_CLIENT_ERROR,
        Err(_) => metrics::OUTCOME_SERVER_ERROR,
    }
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let state = state.read().await;
    Json(HealthResponse {
        status: "ready".to_string(),
        store: state.stats(),
    })
}

async fn insert(
    State(state): State<SharedState>,
    Json(req): Json<InsertRequest>,
) -> Result<Json<InsertResponse>> {
    let start = Instant::now();
    metrics::record_tokens(OP_INSERT, req.tokens.len());

    let mut state = state.write().await;
    let result = state.insert(&req);
    metrics::record_request(OP_INSERT, outcome(&result), start.elapsed());

    match result {
        Ok(stats) => {
            metrics::set_store_size(&state.stats());
            tracing::info!(
                documents = stats.documents,
                entries = stats.entries,
                replayed = stats.replayed,
                "Insert batch accepted"
            );
            Ok(Json(InsertResponse::ok()))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Insert batch rejected");
            Err(e)
        }
    }
}

async fn find(
    State(state): State<SharedState>,
    Json(req): Json<FindRequest>,
) -> Result<Json<FindResponse>> {
    let start = Instant::now();
    metrics::record_tokens(OP_FIND, req.tokens.len());

    let result = state.read().await.find(&req);
    metrics::record_request(OP_FIND, outcome(&result), start.elapsed());

    let documents = result?;
    tracing::debug!(
        trapdoors = req.tokens.len(),
        documents = documents.len(),
        "Find"
    );
    Ok(Json(FindResponse::ok(documents)))
}

async fn pre_find(
    State(state): State<SharedState>,
    Json(req): Json<PreFindRequest>,
) -> Result<Json<PreFindResponse>> {
    let start = Instant::now();
    metrics::record_tokens(OP_PREFIND, req.tokens.len());

    let result = state.read().await.pre_find(&req);
    metrics::record_request(OP_PREFIND, outcome(&result), start.elapsed());

    Ok(Json(PreFindResponse::ok(result?)))
}

/// Create the router with all routes
///
/// `/metrics` is served only when a Prometheus handle is given.
pub fn create_router(state: SharedState, prometheus: Option<PrometheusHandle>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/insert", post(insert))
        .route("/find", post(find))
        .route("/prefind", post(pre_find));

    if let Some(handle) = prometheus {
        router = router.route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    }

    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome(&Ok(())), metrics::OUTCOME_OK);
        assert_eq!(
            outcome::<()>(&Err(StoreError::DuplicateAddress)),
            metrics::OUTCOME_CLIENT_ERROR
        );
        assert_eq!(
            outcome::<()>(&Err(StoreError::Internal("x".into()))),
            metrics::OUTCOME_SERVER_ERROR
        );
    }
}

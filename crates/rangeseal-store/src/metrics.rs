//! Prometheus metrics for the store
//!
//! Privacy-safe metrics: only operation and outcome labels, never token or
//! document content.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

use crate::state::StoreStats;

pub const OP_INSERT: &str = "insert";
pub const OP_FIND: &str = "find";
pub const OP_PREFIND: &str = "prefind";

pub const OUTCOME_OK: &str = "ok";
pub const OUTCOME_CLIENT_ERROR: &str = "client_error";
pub const OUTCOME_SERVER_ERROR: &str = "server_error";

pub fn record_request(op: &str, outcome: &str, duration: Duration) {
    counter!("rangeseal_requests_total", "op" => op.to_string(), "outcome" => outcome.to_string())
        .increment(1);
    histogram!("rangeseal_request_duration_seconds", "op" => op.to_string(), "outcome" => outcome.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_tokens(op: &str, tokens: usize) {
    histogram!("rangeseal_request_tokens", "op" => op.to_string()).record(tokens as f64);
}

pub fn set_store_size(stats: &StoreStats) {
    gauge!("rangeseal_documents").set(stats.documents as f64);
    gauge!("rangeseal_index_entries").set(stats.index_entries as f64);
}

pub fn init_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

//! Central metrics registry and metric definitions
//!
//! Metrics are registered lazily on first access using once_cell::Lazy.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};

// ===== Routing Metrics =====

/// Classified queries by outcome (`matched`, `unmatched`, `error`)
pub static ROUTE_QUERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "semroute_route_queries_total",
        "Total number of classified queries",
        &["outcome"]
    )
    .expect("Failed to register route query counter")
});

/// End-to-end classification latency per request (`single` or `batch`)
pub static CLASSIFY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "semroute_classify_duration_seconds",
        "Classification request duration in seconds",
        &["mode"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register classification duration histogram")
});

// ===== External Calls =====

/// Embedding provider calls by status (`ok`, `error`)
pub static EMBEDDING_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "semroute_embedding_requests_total",
        "Total number of embedding provider requests",
        &["status"]
    )
    .expect("Failed to register embedding request counter")
});

/// Vector index operations by operation and status
pub static INDEX_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "semroute_index_operations_total",
        "Total number of vector index operations",
        &["operation", "status"]
    )
    .expect("Failed to register index operation counter")
});

// ===== Synchronization & Health =====

/// Records written or removed by route synchronization
pub static SYNC_RECORDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "semroute_sync_records_total",
        "Records changed by route synchronization",
        &["action"]
    )
    .expect("Failed to register sync record counter")
});

/// Current health phase (0=starting, 1=ready, 2=degraded)
pub static HEALTH_PHASE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "semroute_health_phase",
        "Health phase (0=starting, 1=ready, 2=degraded)"
    )
    .expect("Failed to register health phase gauge")
});

/// Record the outcome of a vector index call.
pub fn record_index_operation<T, E>(operation: &str, result: &Result<T, E>) {
    let status = if result.is_ok() { "ok" } else { "error" };
    INDEX_OPERATIONS.with_label_values(&[operation, status]).inc();
}

//! Prometheus metrics for Portal calls, registered once via `LazyLock`
//! following the `chains.rs` table-initialization idiom.

use std::sync::LazyLock;

use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

pub static PORTAL_REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!(
        "portal_requests_total",
        "Portal HTTP requests by endpoint and status",
        &["endpoint", "status"]
    )
    .expect("portal_requests_total registration")
});

pub static PORTAL_LATENCY_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "portal_latency_seconds",
        "Portal HTTP request latency by endpoint",
        &["endpoint"]
    )
    .expect("portal_latency_seconds registration")
});

pub static FINALIZED_FALLBACK_TOTAL: LazyLock<prometheus::Counter> = LazyLock::new(|| {
    prometheus::register_counter!(
        "finalized_fallback_total",
        "Times the finalized head endpoint 404'd and fell back to the non-finalized head"
    )
    .expect("finalized_fallback_total registration")
});

pub static NDJSON_LINES_TOTAL: LazyLock<prometheus::Counter> = LazyLock::new(|| {
    prometheus::register_counter!("ndjson_lines_total", "NDJSON lines parsed from Portal streams")
        .expect("ndjson_lines_total registration")
});

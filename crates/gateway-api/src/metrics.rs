//! Gateway-level metrics (C9): request outcomes and payload sizes, separate
//! from the Portal-client-internal counters in `gateway_portal::metrics`.

use std::sync::LazyLock;

use prometheus::{register_counter_vec, CounterVec};

pub static REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!(
        "requests_total",
        "JSON-RPC requests by method, chain id, and outcome",
        &["method", "chain_id", "status"]
    )
    .expect("requests_total registration")
});

pub static RESPONSE_BYTES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!(
        "response_bytes_total",
        "Serialized JSON-RPC response bytes by method and chain id",
        &["method", "chain_id"]
    )
    .expect("response_bytes_total registration")
});

pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!("errors_total", "Erroring JSON-RPC items by error category", &["category"])
        .expect("errors_total registration")
});

//! Gateway front-end (C9): the axum router, concurrency admission, auth,
//! body decoding, and response assembly that wrap [`crate::dispatch`].

use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::{get, post};
use axum::Router;
use flate2::read::GzDecoder;
use gateway_core::chains::{parse_chain_id_header, resolve_chain};
use gateway_core::error::GatewayError;
use gateway_core::jsonrpc::{validate_request, RawRequest, RequestId, Response as RpcResponse};
use serde_json::Value;

use crate::ctx::RequestCtx;
use crate::dispatch::{self, Slot};
use crate::metrics::{ERRORS_TOTAL, REQUESTS_TOTAL, RESPONSE_BYTES_TOTAL};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handle_root))
        .route("/v1/evm/{chain_id}", post(handle_chain))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/capabilities", get(capabilities))
        .route("/metrics", get(metrics_endpoint))
        .with_state(Arc::new(state))
}

async fn handle_root(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> HttpResponse {
    let chain_id = match headers.get("X-Chain-Id").map(|v| v.to_str()) {
        Some(Ok(v)) => match parse_chain_id_header(v) {
            Ok(id) => Some(id),
            Err(e) => return single_error(&e),
        },
        Some(Err(_)) => {
            return single_error(&GatewayError::InvalidRequest("invalid X-Chain-Id header".to_string()))
        }
        None => None,
    };
    handle_request(state, headers, body, chain_id).await
}

async fn handle_chain(
    State(state): State<Arc<AppState>>,
    Path(chain_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    let chain_id = match parse_chain_id_header(&chain_id) {
        Ok(id) => id,
        Err(e) => return single_error(&e),
    };
    handle_request(state, headers, body, Some(chain_id)).await
}

fn single_error(err: &GatewayError) -> HttpResponse {
    let response = RpcResponse::error(RequestId::Null, err);
    let status = response.http_status();
    (status, axum::Json(json_single(&response))).into_response()
}

fn json_single(response: &RpcResponse) -> Value {
    serde_json::to_value(response).expect("jsonrpc response always serializes")
}

fn decompress_gzip(bytes: &[u8], max_bytes: usize) -> Result<Vec<u8>, GatewayError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = decoder
            .read(&mut buf)
            .map_err(|e| GatewayError::InvalidRequest(format!("invalid gzip body: {e}")))?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
        if out.len() > max_bytes {
            return Err(GatewayError::InvalidRequest("request body too large".to_string()));
        }
    }
    Ok(out)
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/") && ct.contains("json"))
        .unwrap_or(true)
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), GatewayError> {
    let Some(expected) = state.config.wrapper_api_key.as_deref() else { return Ok(()) };
    let actual = headers
        .get(state.config.wrapper_api_key_header.as_str())
        .and_then(|v| v.to_str().ok());
    if actual == Some(expected) {
        Ok(())
    } else {
        Err(GatewayError::Unauthorized)
    }
}

async fn handle_request(
    state: Arc<AppState>,
    headers: HeaderMap,
    body: Bytes,
    requested_chain_id: Option<i64>,
) -> HttpResponse {
    let start = Instant::now();

    let Ok(_permit) = state.admission.clone().try_acquire_owned() else {
        return single_error(&GatewayError::Overload);
    };

    if let Err(e) = authorize(&state, &headers) {
        return single_error(&e);
    }

    if !is_json_content_type(&headers) {
        return single_error(&GatewayError::InvalidRequest(
            "content-type must be application/*json*".to_string(),
        ));
    }

    if body.len() > state.config.max_request_body_bytes {
        return single_error(&GatewayError::InvalidRequest("request body too large".to_string()));
    }

    let is_gzip = headers
        .get(axum::http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);

    let raw_bytes = if is_gzip {
        match decompress_gzip(&body, state.config.max_request_body_bytes) {
            Ok(b) => b,
            Err(e) => return single_error(&e),
        }
    } else {
        body.to_vec()
    };

    let parsed: Value = match serde_json::from_slice(&raw_bytes) {
        Ok(v) => v,
        Err(e) => return single_error(&GatewayError::ParseError(format!("parse error: {e}"))),
    };

    let (items, is_batch) = match parsed {
        Value::Array(v) => (v, true),
        other => (vec![other], false),
    };

    if is_batch && items.is_empty() {
        return single_error(&GatewayError::InvalidRequest("batch must not be empty".to_string()));
    }

    let chain = match resolve_chain(&state.config, requested_chain_id) {
        Ok(c) => c,
        Err(e) => return single_error(&e),
    };

    let traceparent = headers.get("traceparent").and_then(|v| v.to_str().ok()).map(str::to_string);
    let ctx = RequestCtx::new(state.config.clone(), state.portal.clone(), state.upstream.clone(), chain, traceparent);

    let slots: Vec<Slot> = items
        .into_iter()
        .map(|raw| match serde_json::from_value::<RawRequest>(raw) {
            Ok(raw) => match validate_request(raw) {
                Ok(req) => Slot::Request(req),
                Err(e) => Slot::Invalid(RpcResponse::error(RequestId::Null, &e)),
            },
            Err(_) => Slot::Invalid(RpcResponse::error(
                RequestId::Null,
                &GatewayError::InvalidRequest("malformed request item".to_string()),
            )),
        })
        .collect();

    let methods: std::collections::HashMap<usize, String> = slots
        .iter()
        .enumerate()
        .filter_map(|(i, s)| match s {
            Slot::Request(r) => Some((i, r.method.clone())),
            Slot::Invalid(_) => None,
        })
        .collect();

    let results = dispatch::run(&ctx, slots).await;

    let chain_id_label = ctx.chain.chain_id.to_string();
    record_metrics(&results, &methods, &chain_id_label);

    assemble_response(results, is_batch, &ctx, start)
}

fn record_metrics(
    results: &[(usize, RpcResponse)],
    methods: &std::collections::HashMap<usize, String>,
    chain_id_label: &str,
) {
    for (index, response) in results {
        let method = methods.get(index).map(String::as_str).unwrap_or("unknown");
        let status = match response.category {
            Some(_) => "error",
            None => "success",
        };
        REQUESTS_TOTAL.with_label_values(&[method, chain_id_label, status]).inc();
        if let Some(category) = response.category {
            ERRORS_TOTAL.with_label_values(&[category]).inc();
        }
        let bytes = serde_json::to_vec(&json_single(response)).unwrap_or_default();
        RESPONSE_BYTES_TOTAL.with_label_values(&[method, chain_id_label]).inc_by(bytes.len() as f64);
    }
}

fn assemble_response(
    mut results: Vec<(usize, RpcResponse)>,
    is_batch: bool,
    ctx: &RequestCtx,
    start: Instant,
) -> HttpResponse {
    results.sort_by_key(|(i, _)| *i);

    if results.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }

    let max_status =
        results.iter().map(|(_, r)| r.http_status()).max_by_key(|s| s.as_u16()).unwrap_or(StatusCode::OK);

    let body = if is_batch {
        Value::Array(results.iter().map(|(_, r)| json_single(r)).collect())
    } else {
        json_single(&results[0].1)
    };

    let mut response = (max_status, axum::Json(body)).into_response();

    let (number, hash) = ctx.finalized_head_headers();
    if let Some(n) = number {
        if let Ok(v) = HeaderValue::from_str(&n) {
            response.headers_mut().insert("X-Sqd-Finalized-Head-Number", v);
        }
    }
    if let Some(h) = hash {
        if let Ok(v) = HeaderValue::from_str(&h) {
            response.headers_mut().insert("X-Sqd-Finalized-Head-Hash", v);
        }
    }

    tracing::info!(
        chain_id = ctx.chain.chain_id,
        status = max_status.as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "request handled"
    );

    response
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Only single-chain mode has a resolvable dataset without a client-supplied
    // chain id; multi-chain mode reports ready without probing Portal.
    let Ok(chain) = resolve_chain(&state.config, None) else {
        return (StatusCode::OK, "ready").into_response();
    };
    let dataset_url = gateway_portal::PortalClient::dataset_url(&chain.portal_base_url, &chain.dataset);
    match state.portal.metadata(&dataset_url, None).await {
        Ok(_) => (StatusCode::OK, "ready").into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response(),
    }
}

async fn capabilities(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let methods = [
        "eth_chainId",
        "eth_blockNumber",
        "eth_getBlockByNumber",
        "eth_getTransactionByBlockNumberAndIndex",
        "eth_getLogs",
        "trace_block",
    ];
    let upstream_methods =
        ["eth_getBlockByHash", "eth_getTransactionByHash", "eth_getTransactionReceipt", "trace_transaction"];
    let service_mode = match state.config.service_mode {
        gateway_core::config::ServiceMode::Single => "single",
        gateway_core::config::ServiceMode::Multi => "multi",
    };
    axum::Json(serde_json::json!({
        "serviceMode": service_mode,
        "methods": methods,
        "upstreamMethods": if state.config.upstream_methods_enabled { upstream_methods.to_vec() } else { vec![] },
    }))
}

async fn metrics_endpoint() -> impl IntoResponse {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    if encoder.encode(&metric_families, &mut buf).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }
    (
        [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
        buf,
    )
        .into_response()
}

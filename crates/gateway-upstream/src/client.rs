//! Upstream RPC client (C6): forwards one JSON-RPC request to a configured
//! EVM endpoint. Grounded on the `risc0-zeth` rpc-proxy `forward_request`
//! pattern (reqwest POST passthrough) and a shared, pre-built `reqwest::Client`.

use gateway_core::error::GatewayError;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// An upstream JSON-RPC error translated into the local taxonomy, carrying
/// the remote `data` payload verbatim when it was an object.
pub struct ForwardedError {
    pub error: GatewayError,
    pub data: Option<Value>,
}

/// HTTP client for forwarding requests to upstream EVM JSON-RPC endpoints.
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build reqwest client"),
        }
    }

    /// POSTs `{jsonrpc: "2.0", id: 1, method, params}` to `url` and returns
    /// the decoded `result`, or a [`ForwardedError`] translated from the
    /// remote error object (or a transport/parse failure).
    pub async fn forward(&self, url: &str, method: &str, params: Value) -> Result<Value, ForwardedError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });

        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let value: Value = resp.json().await.map_err(|e| ForwardedError {
            error: GatewayError::ServerError(format!("invalid upstream response: {e}")),
            data: None,
        })?;

        if !status.is_success() && value.get("error").is_none() {
            return Err(ForwardedError {
                error: GatewayError::ServerError(format!("upstream returned {status}")),
                data: None,
            });
        }

        if let Some(error) = value.get("error") {
            return Err(map_remote_error(error));
        }

        value.get("result").cloned().ok_or_else(|| ForwardedError {
            error: GatewayError::ServerError("upstream response missing result".to_string()),
            data: None,
        })
    }
}

fn transport_error(e: reqwest::Error) -> ForwardedError {
    let error = if e.is_timeout() {
        GatewayError::Unavailable("upstream request timed out".to_string())
    } else {
        GatewayError::ServerError(format!("upstream transport error: {e}"))
    };
    ForwardedError { error, data: None }
}

/// Maps a remote JSON-RPC error object's numeric code to the local taxonomy.
/// Unrecognized codes default to `server_error` (HTTP 502).
fn map_remote_error(error: &Value) -> ForwardedError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = error.get("message").and_then(Value::as_str).unwrap_or("upstream error").to_string();
    let data = error.get("data").filter(|d| d.is_object()).cloned();

    let gateway_error = match code {
        -32600 => GatewayError::InvalidRequest(message),
        -32601 => GatewayError::UnsupportedMethod(message),
        -32602 => GatewayError::InvalidParams(message),
        -32001 | -32004 => GatewayError::NotFound(message),
        -32005 | -32029 => GatewayError::RateLimit(message),
        4100 => GatewayError::Unauthorized,
        _ => GatewayError::ServerError(message),
    };

    ForwardedError { error: gateway_error, data }
}

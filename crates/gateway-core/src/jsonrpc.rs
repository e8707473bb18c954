//! JSON-RPC 2.0 envelope types shared by the gateway front-end and handlers.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

/// Request identifier: string, number, or `null`. Per the JSON-RPC 2.0 spec,
/// the same value is echoed back in the response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(f64),
    Null,
}

/// A single parsed JSON-RPC request item.
///
/// Deserialization is intentionally permissive (fields are optional) so the
/// gateway can distinguish "malformed JSON" (fails at the payload level) from
/// "malformed JSON-RPC item" (replaced with a per-item `invalid_request`
/// error).
#[derive(Debug, Clone, Deserialize)]
pub struct RawRequest {
    pub jsonrpc: Option<Value>,
    pub id: Option<Value>,
    pub method: Option<Value>,
    pub params: Option<Value>,
}

/// A validated JSON-RPC request item ready for dispatch.
#[derive(Debug, Clone)]
pub struct Request {
    /// `None` denotes a notification: no response is ever emitted for it.
    pub id: Option<RequestId>,
    pub method: String,
    pub params: Params,
}

/// Validated `params`: either a positional array or a named object. `null`
/// and absent both normalize to an empty array.
#[derive(Debug, Clone)]
pub enum Params {
    Array(Vec<Value>),
    Object(serde_json::Map<String, Value>),
}

impl Params {
    pub fn get(&self, index: usize) -> Option<&Value> {
        match self {
            Params::Array(v) => v.get(index),
            Params::Object(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Array(v) => v.len(),
            Params::Object(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validates one raw item: `jsonrpc` must be `"2.0"`,
/// `method` a string, `id` (if present) a string/number/null with a finite
/// number, `params` (if present) an array or object.
pub fn validate_request(raw: RawRequest) -> Result<Request, GatewayError> {
    match &raw.jsonrpc {
        Some(Value::String(s)) if s == "2.0" => {}
        _ => return Err(GatewayError::InvalidRequest("jsonrpc must be \"2.0\"".to_string())),
    }

    let method = match raw.method {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => return Err(GatewayError::InvalidRequest("method must be a non-empty string".to_string())),
    };

    let id = match raw.id {
        None => None,
        Some(Value::Null) => Some(RequestId::Null),
        Some(Value::String(s)) => Some(RequestId::String(s)),
        Some(Value::Number(n)) => {
            let f = n.as_f64().ok_or_else(|| {
                GatewayError::InvalidRequest("id number must be finite".to_string())
            })?;
            if !f.is_finite() {
                return Err(GatewayError::InvalidRequest("id number must be finite".to_string()));
            }
            Some(RequestId::Number(f))
        }
        Some(_) => {
            return Err(GatewayError::InvalidRequest(
                "id must be a string, number, or null".to_string(),
            ))
        }
    };

    let params = match raw.params {
        None | Some(Value::Null) => Params::Array(Vec::new()),
        Some(Value::Array(v)) => Params::Array(v),
        Some(Value::Object(m)) => Params::Object(m),
        Some(_) => {
            return Err(GatewayError::InvalidRequest(
                "params must be an array, object, or null".to_string(),
            ))
        }
    };

    Ok(Request { id, method, params })
}

/// A successful or erroring JSON-RPC 2.0 response item.
///
/// `http_status`/`category` are not part of the wire shape (hence
/// `#[serde(skip)]`); they carry the per-item HTTP status and error category
/// alongside the response so batch assembly and metrics don't need to
/// re-derive them from the JSON-RPC `code`, which alone is ambiguous (several
/// categories share `-32603`).
#[derive(Debug, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    #[serde(flatten)]
    pub payload: ResponsePayload,
    #[serde(skip)]
    pub http_status: StatusCode,
    #[serde(skip)]
    pub category: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Result { result: Value },
    Error { error: ErrorObject },
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            payload: ResponsePayload::Result { result },
            http_status: StatusCode::OK,
            category: None,
        }
    }

    pub fn error(id: RequestId, err: &GatewayError) -> Self {
        Self::error_with_data(id, err, None)
    }

    /// Like [`Response::error`], but overrides `data` when `data_override` is
    /// `Some` (used when forwarding an upstream JSON-RPC error's own `data`).
    pub fn error_with_data(id: RequestId, err: &GatewayError, data_override: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            payload: ResponsePayload::Error {
                error: ErrorObject {
                    code: err.code(),
                    message: err.to_string(),
                    data: data_override.or_else(|| err.data()),
                },
            },
            http_status: err.http_status(),
            category: Some(err.category()),
        }
    }

    pub fn http_status(&self) -> StatusCode {
        self.http_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(jsonrpc: &str, id: Value, method: &str, params: Value) -> RawRequest {
        RawRequest {
            jsonrpc: Some(Value::String(jsonrpc.to_string())),
            id: Some(id),
            method: Some(Value::String(method.to_string())),
            params: Some(params),
        }
    }

    #[test]
    fn validates_a_well_formed_request() {
        let r = raw("2.0", Value::from(1), "eth_chainId", serde_json::json!([]));
        let parsed = validate_request(r).unwrap();
        assert_eq!(parsed.method, "eth_chainId");
        assert_eq!(parsed.id, Some(RequestId::Number(1.0)));
    }

    #[test]
    fn notification_has_no_id() {
        let r = RawRequest {
            jsonrpc: Some(Value::String("2.0".to_string())),
            id: None,
            method: Some(Value::String("eth_chainId".to_string())),
            params: None,
        };
        let parsed = validate_request(r).unwrap();
        assert_eq!(parsed.id, None);
    }

    #[test]
    fn rejects_wrong_jsonrpc_version() {
        let r = raw("1.0", Value::from(1), "eth_chainId", serde_json::json!([]));
        assert!(validate_request(r).is_err());
    }

    #[test]
    fn rejects_missing_method() {
        let r = RawRequest {
            jsonrpc: Some(Value::String("2.0".to_string())),
            id: Some(Value::from(1)),
            method: None,
            params: None,
        };
        assert!(validate_request(r).is_err());
    }

    #[test]
    fn rejects_non_finite_id() {
        let r = RawRequest {
            jsonrpc: Some(Value::String("2.0".to_string())),
            id: Some(serde_json::json!(f64::NAN)),
            method: Some(Value::String("m".to_string())),
            params: None,
        };
        // serde_json can't represent NaN as a Number, so this exercises object-id rejection instead.
        let r2 = RawRequest { id: Some(serde_json::json!({})), ..r };
        assert!(validate_request(r2).is_err());
    }
}

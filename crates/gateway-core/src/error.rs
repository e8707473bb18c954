//! The error taxonomy (C10): categorized errors with a JSON-RPC code, an HTTP
//! status, and a canonical message. Every error that reaches a client crosses
//! through [`GatewayError`] so logging, metrics and wire encoding stay in sync.

use axum::http::StatusCode;
use serde_json::Value;

/// One entry of the error taxonomy table. The variant name is the
/// error's `category` for counters and the `code()`/`http_status()` methods.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("range too large; max block range {max}")]
    RangeTooLarge { max: u64 },

    #[error("specify less number of address")]
    TooManyAddresses,

    #[error("method not supported: {0}")]
    UnsupportedMethod(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limit: {0}")]
    RateLimit(String),

    #[error("{0}")]
    NotFound(String),

    #[error("conflict")]
    Conflict { retryable: bool, previous_blocks: Option<Vec<u64>> },

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("unavailable")]
    Overload,

    #[error("server error: {0}")]
    ServerError(String),
}

impl GatewayError {
    /// Machine-readable category used for the `errors_total{category}` counter.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ParseError(_) => "parse_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidParams(_) => "invalid_params",
            Self::RangeTooLarge { .. } => "range_too_large",
            Self::TooManyAddresses => "too_many_addresses",
            Self::UnsupportedMethod(_) => "unsupported_method",
            Self::Unauthorized => "unauthorized",
            Self::RateLimit(_) => "rate_limit",
            Self::NotFound(_) => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Unavailable(_) => "unavailable",
            Self::Overload => "overload",
            Self::ServerError(_) => "server_error",
        }
    }

    /// JSON-RPC error code.
    pub fn code(&self) -> i64 {
        match self {
            Self::ParseError(_) => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::InvalidParams(_) => -32602,
            Self::RangeTooLarge { .. } | Self::TooManyAddresses => -32012,
            Self::UnsupportedMethod(_) => -32601,
            Self::Unauthorized => -32016,
            Self::RateLimit(_) => -32005,
            Self::NotFound(_) => -32014,
            Self::Conflict { .. } | Self::Unavailable(_) | Self::Overload | Self::ServerError(_) => {
                -32603
            }
        }
    }

    /// HTTP status.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::ParseError(_) | Self::InvalidRequest(_) | Self::InvalidParams(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::RangeTooLarge { .. } | Self::TooManyAddresses => StatusCode::BAD_REQUEST,
            Self::UnsupportedMethod(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unavailable(_) | Self::Overload => StatusCode::SERVICE_UNAVAILABLE,
            Self::ServerError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Optional `data` payload attached to the JSON-RPC error object.
    pub fn data(&self) -> Option<Value> {
        match self {
            Self::Conflict { retryable, previous_blocks } => Some(serde_json::json!({
                "retryable": retryable,
                "previousBlocks": previous_blocks,
            })),
            Self::RangeTooLarge { max } => Some(serde_json::json!({ "maxBlockRange": max })),
            _ => None,
        }
    }

    pub fn pending_not_found() -> Self {
        Self::InvalidParams("pending block not found".to_string())
    }

    pub fn block_hash_not_supported() -> Self {
        Self::InvalidParams("blockHash filter not supported".to_string())
    }

    pub fn invalid_block_number(detail: impl std::fmt::Display) -> Self {
        Self::InvalidParams(format!("invalid block number: {detail}"))
    }

    pub fn invalid_block_range() -> Self {
        Self::InvalidParams("invalid block range".to_string())
    }

    pub fn invalid_transaction_index(detail: impl std::fmt::Display) -> Self {
        Self::InvalidParams(format!("invalid transaction index: {detail}"))
    }

    pub fn request_timeout() -> Self {
        Self::ServerError("request timeout".to_string())
    }

    pub fn portal_stream_interrupted() -> Self {
        Self::Unavailable("portal stream interrupted".to_string())
    }

    pub fn block_not_found() -> Self {
        Self::NotFound("block not found".to_string())
    }

    pub fn data_not_available() -> Self {
        Self::NotFound("requested data is not available".to_string())
    }
}

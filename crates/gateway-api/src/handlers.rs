//! Per-method dispatch (C7): each EVM JSON-RPC method resolved against the
//! Portal client through [`RequestCtx`], or proxied upstream when Portal
//! can't serve it by design (hash-keyed lookups, pending state).

use gateway_core::error::GatewayError;
use gateway_core::hex::u64_hex;
use gateway_core::jsonrpc::Params;
use gateway_core::portal::{BlockFields, FieldSelection, LogFields, RangeRequest, TraceFields, TransactionFields};
use gateway_core::shape::{shape_block, shape_log, shape_trace, shape_transaction};
use gateway_core::validate::{parse_block_number, parse_log_filter, parse_transaction_index, LogFilterResolution, RawLogFilter};
use gateway_upstream::ForwardedError;
use serde_json::{json, Value};

use crate::ctx::RequestCtx;

/// Wraps a [`GatewayError`] with the optional structured `data` an upstream
/// JSON-RPC error carried, so it survives the trip through a handler and
/// reaches the wire response (plain `GatewayError::data()` can't express it).
pub struct HandlerError {
    pub error: GatewayError,
    pub data: Option<Value>,
}

impl From<GatewayError> for HandlerError {
    fn from(error: GatewayError) -> Self {
        Self { error, data: None }
    }
}

impl From<ForwardedError> for HandlerError {
    fn from(e: ForwardedError) -> Self {
        Self { error: e.error, data: e.data }
    }
}

pub(crate) fn param(params: &Params, i: usize) -> Value {
    params.get(i).cloned().unwrap_or(Value::Null)
}

pub(crate) fn params_value(params: &Params) -> Value {
    match params {
        Params::Array(v) => Value::Array(v.clone()),
        Params::Object(m) => Value::Object(m.clone()),
    }
}

pub(crate) fn is_pending(v: &Value) -> bool {
    matches!(v, Value::String(s) if s == "pending")
}

fn is_block_hash_tag(v: &Value) -> bool {
    matches!(v, Value::String(s) if s.starts_with("0x") && s.len() == 66)
}

pub(crate) fn parse_full_tx(v: &Value) -> Result<bool, GatewayError> {
    match v {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(*b),
        other => Err(GatewayError::InvalidParams(format!("fullTx must be a boolean: {other}"))),
    }
}

/// Resolves the upstream URL for this request's chain, ignoring whether
/// fallback usage is enabled (see [`upstream_enabled`]).
pub(crate) fn upstream_url(ctx: &RequestCtx) -> Option<&str> {
    ctx.config.upstream_url_for(ctx.chain.chain_id)
}

/// Resolves the upstream URL gated by `UPSTREAM_METHODS_ENABLED`: the single
/// flag that enables both the upstream-only methods and the pending/blockHash
/// fallback paths, so operators don't need a second toggle for the same
/// "do we trust an upstream RPC" decision.
pub(crate) fn upstream_enabled(ctx: &RequestCtx) -> Option<&str> {
    if ctx.config.upstream_methods_enabled {
        upstream_url(ctx)
    } else {
        None
    }
}

async fn proxy_upstream(ctx: &RequestCtx, url: &str, method: &str, params: Value) -> Result<Value, HandlerError> {
    ctx.upstream.forward(url, method, params).await.map_err(HandlerError::from)
}

async fn eth_chain_id(ctx: &RequestCtx) -> Result<Value, HandlerError> {
    Ok(json!(format!("0x{:x}", ctx.chain.chain_id)))
}

async fn eth_block_number(ctx: &RequestCtx) -> Result<Value, HandlerError> {
    let head = ctx.head(false).await?;
    Ok(json!(u64_hex(head.number)))
}

async fn eth_get_block_by_number(ctx: &RequestCtx, params: &Params) -> Result<Value, HandlerError> {
    let tag_value = param(params, 0);
    let full_tx = parse_full_tx(&param(params, 1))?;

    if is_pending(&tag_value) {
        return match upstream_enabled(ctx) {
            Some(url) => proxy_upstream(ctx, url, "eth_getBlockByNumber", params_value(params)).await,
            None => Err(GatewayError::pending_not_found().into()),
        };
    }

    let tag = parse_block_number(ctx, &ctx.dataset_base_url, &tag_value, &ctx.config).await?;

    if let Some(start) = ctx.start_block().await? {
        if tag.number < start {
            return Ok(Value::Null);
        }
    }

    let mut fields = FieldSelection { block: BlockFields::all(), ..Default::default() };
    fields.transaction = Some(if full_tx { TransactionFields::all() } else { TransactionFields::hash_only() });
    let mut request = RangeRequest::new(tag.number, Some(tag.number), fields);
    request.transactions = Some(vec![Default::default()]);

    let blocks = ctx
        .portal
        .stream_blocks(
            &ctx.dataset_base_url,
            tag.use_finalized,
            request,
            ctx.config.max_ndjson_line_bytes,
            ctx.config.max_ndjson_bytes,
            Some(ctx.header_sink()),
            ctx.traceparent(),
        )
        .await?;

    match blocks.into_iter().next() {
        None => Ok(Value::Null),
        Some(block) => {
            let uncles = ctx.uncles_for(upstream_url(ctx), tag.number).await;
            Ok(shape_block(&block, full_tx, uncles))
        }
    }
}

async fn eth_get_transaction_by_block_number_and_index(
    ctx: &RequestCtx,
    params: &Params,
) -> Result<Value, HandlerError> {
    let tag_value = param(params, 0);
    let index = parse_transaction_index(&param(params, 1))?;

    let tag = parse_block_number(ctx, &ctx.dataset_base_url, &tag_value, &ctx.config).await?;

    if let Some(start) = ctx.start_block().await? {
        if tag.number < start {
            return Ok(Value::Null);
        }
    }

    let mut fields = FieldSelection { block: BlockFields::correlation(), ..Default::default() };
    fields.transaction = Some(TransactionFields::all());
    let mut request = RangeRequest::new(tag.number, Some(tag.number), fields);
    request.transactions = Some(vec![Default::default()]);

    let blocks = ctx
        .portal
        .stream_blocks(
            &ctx.dataset_base_url,
            tag.use_finalized,
            request,
            ctx.config.max_ndjson_line_bytes,
            ctx.config.max_ndjson_bytes,
            Some(ctx.header_sink()),
            ctx.traceparent(),
        )
        .await?;

    let block = match blocks.into_iter().next() {
        Some(b) => b,
        None => return Ok(Value::Null),
    };

    Ok(find_transaction(&block.transactions, index).map(shape_transaction).unwrap_or(Value::Null))
}

fn find_transaction(
    transactions: &[gateway_core::portal::PortalTransaction],
    index: u64,
) -> Option<&gateway_core::portal::PortalTransaction> {
    transactions
        .get(index as usize)
        .filter(|t| t.transaction_index == Some(index))
        .or_else(|| transactions.iter().find(|t| t.transaction_index == Some(index)))
}

async fn eth_get_logs(ctx: &RequestCtx, params: &Params) -> Result<Value, HandlerError> {
    let raw: RawLogFilter =
        serde_json::from_value(param(params, 0)).map_err(|e| GatewayError::InvalidParams(format!("invalid filter: {e}")))?;

    let resolution = parse_log_filter(ctx, &ctx.dataset_base_url, raw, &ctx.config).await?;

    let filter = match resolution {
        LogFilterResolution::BlockHash(_) => {
            return match upstream_enabled(ctx) {
                Some(url) => proxy_upstream(ctx, url, "eth_getLogs", params_value(params)).await,
                None => Err(GatewayError::block_hash_not_supported().into()),
            };
        }
        LogFilterResolution::Range(f) => f,
    };

    let to_block = filter.to_block;
    let mut from_block = filter.from_block;
    if let Some(start) = ctx.start_block().await? {
        if to_block < start {
            return Ok(json!([]));
        }
        from_block = from_block.max(start);
    }

    let mut selector = serde_json::Map::new();
    if !filter.addresses.is_empty() {
        selector.insert("address".to_string(), json!(filter.addresses));
    }
    if !filter.topics.is_empty() {
        selector.insert("topics".to_string(), json!(filter.topics));
    }

    let mut fields = FieldSelection { block: BlockFields::minimal(), ..Default::default() };
    fields.log = Some(LogFields::all());
    let mut request = RangeRequest::new(from_block, Some(to_block), fields);
    request.logs = Some(vec![selector]);

    let blocks = ctx
        .portal
        .stream_blocks(
            &ctx.dataset_base_url,
            filter.use_finalized,
            request,
            ctx.config.max_ndjson_line_bytes,
            ctx.config.max_ndjson_bytes,
            Some(ctx.header_sink()),
            ctx.traceparent(),
        )
        .await?;

    let logs: Vec<Value> = blocks.iter().flat_map(|b| b.logs.iter().map(shape_log)).collect();
    Ok(Value::Array(logs))
}

async fn trace_block(ctx: &RequestCtx, params: &Params) -> Result<Value, HandlerError> {
    let tag_value = param(params, 0);

    if is_pending(&tag_value) {
        return match upstream_enabled(ctx) {
            Some(url) => proxy_upstream(ctx, url, "trace_block", params_value(params)).await,
            None => Err(GatewayError::pending_not_found().into()),
        };
    }
    if is_block_hash_tag(&tag_value) {
        return match upstream_enabled(ctx) {
            Some(url) => proxy_upstream(ctx, url, "trace_block", params_value(params)).await,
            None => Err(GatewayError::block_hash_not_supported().into()),
        };
    }

    let tag = parse_block_number(ctx, &ctx.dataset_base_url, &tag_value, &ctx.config).await?;

    if let Some(start) = ctx.start_block().await? {
        if tag.number < start {
            return Ok(json!([]));
        }
    }

    let mut fields = FieldSelection { block: BlockFields::minimal(), ..Default::default() };
    fields.transaction = Some(TransactionFields::hash_only());
    fields.trace = Some(TraceFields::all());
    let mut request = RangeRequest::new(tag.number, Some(tag.number), fields);
    request.traces = Some(vec![Default::default()]);
    request.transactions = Some(vec![Default::default()]);

    let blocks = ctx
        .portal
        .stream_blocks(
            &ctx.dataset_base_url,
            tag.use_finalized,
            request,
            ctx.config.max_ndjson_line_bytes,
            ctx.config.max_ndjson_bytes,
            Some(ctx.header_sink()),
            ctx.traceparent(),
        )
        .await?;

    let block = match blocks.into_iter().next() {
        Some(b) => b,
        None => return Ok(json!([])),
    };

    Ok(Value::Array(shape_traces(&block)))
}

pub(crate) fn shape_traces(block: &gateway_core::portal::PortalBlock) -> Vec<Value> {
    block
        .traces
        .iter()
        .map(|t| {
            let fallback_hash =
                t.transaction_position.and_then(|p| block.transactions.get(p as usize)).map(|tx| tx.hash.as_str());
            shape_trace(t, fallback_hash, t.transaction_position)
        })
        .collect()
}

async fn upstream_only(ctx: &RequestCtx, method: &str, params: &Params) -> Result<Value, HandlerError> {
    match upstream_enabled(ctx) {
        Some(url) => proxy_upstream(ctx, url, method, params_value(params)).await,
        None => Err(GatewayError::UnsupportedMethod(method.to_string()).into()),
    }
}

/// Dispatches one JSON-RPC method call.
pub async fn dispatch(ctx: &RequestCtx, method: &str, params: &Params) -> Result<Value, HandlerError> {
    match method {
        "eth_chainId" => eth_chain_id(ctx).await,
        "eth_blockNumber" => eth_block_number(ctx).await,
        "eth_getBlockByNumber" => eth_get_block_by_number(ctx, params).await,
        "eth_getTransactionByBlockNumberAndIndex" => {
            eth_get_transaction_by_block_number_and_index(ctx, params).await
        }
        "eth_getLogs" => eth_get_logs(ctx, params).await,
        "trace_block" => trace_block(ctx, params).await,
        "eth_getBlockByHash" | "eth_getTransactionByHash" | "eth_getTransactionReceipt" | "trace_transaction" => {
            upstream_only(ctx, method, params).await
        }
        other => Err(GatewayError::UnsupportedMethod(other.to_string()).into()),
    }
}

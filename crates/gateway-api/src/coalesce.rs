//! Batch coalescer (C8): fuses contiguous single-block JSON-RPC batch items
//! into one Portal range stream per (method, group key) segment.
//!
//! `eth_getBlockByNumber`, `eth_getTransactionByBlockNumberAndIndex`, and
//! `trace_block` participate: all three take a single block tag and can
//! share one range fetch. Items with a symbolic tag (`"latest"`,
//! `"pending"`, ...) or whose tag can't be parsed without a round trip are
//! left for individual dispatch.

use std::collections::HashMap;

use gateway_core::jsonrpc::{Request, RequestId, Response};
use gateway_core::portal::{
    BlockFields, FieldSelection, PortalTransaction, RangeRequest, TraceFields, TransactionFields,
};
use gateway_core::shape::{shape_block, shape_transaction};
use serde_json::Value;

use crate::ctx::RequestCtx;
use crate::handlers::{self, parse_full_tx};

/// What distinguishes two otherwise-adjacent items as belonging to different
/// coalesced segments: same method, same full-transaction/index shape.
/// `eth_getTransactionByBlockNumberAndIndex` items all key to the same group
/// regardless of index — the handler fetches the whole block's transactions
/// and does the index lookup client-side, so one shared stream serves every
/// index in a contiguous block range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    GetBlockByNumber { full_tx: bool },
    GetTransactionByBlockNumberAndIndex,
    TraceBlock,
}

struct Item<'a> {
    slot: usize,
    id: RequestId,
    request: &'a Request,
    number: u64,
    group: GroupKey,
}

/// Attempts to coalesce one item: only items with a literal (non-symbolic)
/// block number qualify, since symbolic tags (`latest`, `pending`, ...)
/// require a head lookup this pass intentionally skips.
fn literal_block_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.as_str();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).ok()
            } else {
                s.parse::<u64>().ok()
            }
        }
        _ => None,
    }
}

fn classify<'a>(slot: usize, request: &'a Request, id: &RequestId) -> Option<Item<'a>> {
    match request.method.as_str() {
        "eth_getBlockByNumber" => {
            let number = literal_block_number(request.params.get(0)?)?;
            let full_tx = parse_full_tx(&request.params.get(1).cloned().unwrap_or(Value::Null)).ok()?;
            Some(Item { slot, id: id.clone(), request, number, group: GroupKey::GetBlockByNumber { full_tx } })
        }
        "eth_getTransactionByBlockNumberAndIndex" => {
            let number = literal_block_number(request.params.get(0)?)?;
            let index_value = request.params.get(1)?;
            gateway_core::validate::parse_transaction_index(index_value).ok()?;
            Some(Item {
                slot,
                id: id.clone(),
                request,
                number,
                group: GroupKey::GetTransactionByBlockNumberAndIndex,
            })
        }
        "trace_block" => {
            let number = literal_block_number(request.params.get(0)?)?;
            Some(Item { slot, id: id.clone(), request, number, group: GroupKey::TraceBlock })
        }
        _ => None,
    }
}

/// Splits sorted, deduplicated block numbers into maximal contiguous runs.
fn contiguous_segments(mut numbers: Vec<u64>) -> Vec<(u64, u64)> {
    numbers.sort_unstable();
    numbers.dedup();
    let mut segments = Vec::new();
    let mut iter = numbers.into_iter();
    let Some(mut start) = iter.next() else { return segments };
    let mut end = start;
    for n in iter {
        if n == end + 1 {
            end = n;
        } else {
            segments.push((start, end));
            start = n;
            end = n;
        }
    }
    segments.push((start, end));
    segments
}

fn build_request(group: &GroupKey, from: u64, to: u64) -> RangeRequest {
    let mut fields = FieldSelection { block: BlockFields::minimal(), ..Default::default() };
    match group {
        GroupKey::GetBlockByNumber { full_tx } => {
            fields.block = BlockFields::all();
            fields.transaction = Some(if *full_tx { TransactionFields::all() } else { TransactionFields::hash_only() });
            let mut r = RangeRequest::new(from, Some(to), fields);
            r.transactions = Some(vec![Default::default()]);
            r
        }
        GroupKey::GetTransactionByBlockNumberAndIndex => {
            fields.block = BlockFields::correlation();
            fields.transaction = Some(TransactionFields::all());
            let mut r = RangeRequest::new(from, Some(to), fields);
            r.transactions = Some(vec![Default::default()]);
            r
        }
        GroupKey::TraceBlock => {
            fields.transaction = Some(TransactionFields::hash_only());
            fields.trace = Some(TraceFields::all());
            let mut r = RangeRequest::new(from, Some(to), fields);
            r.traces = Some(vec![Default::default()]);
            r.transactions = Some(vec![Default::default()]);
            r
        }
    }
}

fn find_transaction(transactions: &[PortalTransaction], index: u64) -> Option<&PortalTransaction> {
    transactions
        .get(index as usize)
        .filter(|t| t.transaction_index == Some(index))
        .or_else(|| transactions.iter().find(|t| t.transaction_index == Some(index)))
}

/// Runs the coalescer over a batch's candidate items, returning the subset of
/// slots it could resolve. Slots it can't handle (no match, Portal error that
/// should fall back to a head/metadata lookup, etc.) are simply absent so the
/// caller dispatches them individually.
pub async fn run(ctx: &RequestCtx, items: &[(usize, RequestId, &Request)]) -> HashMap<usize, Response> {
    let mut out = HashMap::new();
    if items.len() < 2 {
        return out;
    }

    let candidates: Vec<Item> =
        items.iter().filter_map(|(slot, id, req)| classify(*slot, req, id)).collect();

    let mut by_group: HashMap<GroupKey, Vec<&Item>> = HashMap::new();
    for item in &candidates {
        by_group.entry(item.group.clone()).or_default().push(item);
    }

    let start_block = match ctx.start_block().await {
        Ok(v) => v,
        Err(_) => None,
    };

    for (group, group_items) in by_group {
        if group_items.len() < 2 {
            continue;
        }
        let numbers: Vec<u64> = group_items.iter().map(|i| i.number).collect();
        for (from, to) in contiguous_segments(numbers) {
            let segment_items: Vec<&&Item> =
                group_items.iter().filter(|i| i.number >= from && i.number <= to).collect();
            if segment_items.len() < 2 {
                continue;
            }

            let request = build_request(&group, from, to);
            let stream_result = ctx
                .portal
                .stream_blocks(
                    &ctx.dataset_base_url,
                    false,
                    request,
                    ctx.config.max_ndjson_line_bytes,
                    ctx.config.max_ndjson_bytes,
                    Some(ctx.header_sink()),
                    ctx.traceparent(),
                )
                .await;

            let blocks = match stream_result {
                Ok(b) => b,
                Err(e) => {
                    for item in &segment_items {
                        out.insert(item.slot, Response::error(item.id.clone(), &e));
                    }
                    continue;
                }
            };

            if let Some(start) = start_block {
                if to < start {
                    for item in &segment_items {
                        out.insert(item.slot, Response::success(item.id.clone(), Value::Null));
                    }
                    continue;
                }
            }

            let by_number: HashMap<u64, &gateway_core::portal::PortalBlock> =
                blocks.iter().map(|b| (b.header.number, b)).collect();

            for item in segment_items {
                let result = match &item.group {
                    GroupKey::GetBlockByNumber { full_tx } => match by_number.get(&item.number) {
                        Some(block) => {
                            let uncles = ctx.uncles_for(handlers::upstream_url(ctx), item.number).await;
                            shape_block(block, *full_tx, uncles)
                        }
                        None => Value::Null,
                    },
                    GroupKey::GetTransactionByBlockNumberAndIndex => match by_number.get(&item.number) {
                        Some(block) => {
                            let index_value = item.request.params.get(1).cloned().unwrap_or(Value::Null);
                            match gateway_core::validate::parse_transaction_index(&index_value) {
                                Ok(index) => find_transaction(&block.transactions, index)
                                    .map(shape_transaction)
                                    .unwrap_or(Value::Null),
                                Err(_) => Value::Null,
                            }
                        }
                        None => Value::Null,
                    },
                    GroupKey::TraceBlock => match by_number.get(&item.number) {
                        Some(block) => Value::Array(handlers::shape_traces(block)),
                        None => Value::Array(vec![]),
                    },
                };
                out.insert(item.slot, Response::success(item.id.clone(), result));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_maximal_contiguous_runs() {
        assert_eq!(contiguous_segments(vec![5, 6, 8]), vec![(5, 6), (8, 8)]);
    }

    #[test]
    fn single_number_is_its_own_segment() {
        assert_eq!(contiguous_segments(vec![42]), vec![(42, 42)]);
    }

    #[test]
    fn deduplicates_before_splitting() {
        assert_eq!(contiguous_segments(vec![3, 3, 4, 4, 5]), vec![(3, 5)]);
    }

    #[test]
    fn empty_input_yields_no_segments() {
        assert!(contiguous_segments(vec![]).is_empty());
    }

    #[test]
    fn parses_hex_and_decimal_literals() {
        assert_eq!(literal_block_number(&Value::String("0x10".to_string())), Some(16));
        assert_eq!(literal_block_number(&Value::String("16".to_string())), Some(16));
        assert_eq!(literal_block_number(&Value::String("latest".to_string())), None);
    }

    #[test]
    fn classifies_trace_block_by_literal_number() {
        let request = Request {
            id: Some(RequestId::Number(1.0)),
            method: "trace_block".to_string(),
            params: gateway_core::jsonrpc::Params::Array(vec![Value::String("0x8".to_string())]),
        };
        let item = classify(0, &request, &RequestId::Number(1.0)).expect("trace_block should classify");
        assert_eq!(item.number, 8);
        assert_eq!(item.group, GroupKey::TraceBlock);
    }

    #[test]
    fn transaction_by_index_items_share_one_group_regardless_of_index() {
        let make = |index: u64| Request {
            id: Some(RequestId::Number(1.0)),
            method: "eth_getTransactionByBlockNumberAndIndex".to_string(),
            params: gateway_core::jsonrpc::Params::Array(vec![
                Value::String("0x5".to_string()),
                Value::String(format!("0x{index:x}")),
            ]),
        };
        let a = make(0);
        let b = make(3);
        let item_a = classify(0, &a, &RequestId::Number(1.0)).unwrap();
        let item_b = classify(1, &b, &RequestId::Number(2.0)).unwrap();
        assert_eq!(item_a.group, item_b.group);
    }
}

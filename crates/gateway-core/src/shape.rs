//! Response Shaper (C5): turns Portal wire records into the canonical
//! JSON-RPC objects Ethereum clients expect. Pure, typed-in typed-out.

use serde_json::{json, Map, Value};

use crate::hex::u64_hex;
use crate::portal::{PortalBlock, PortalLog, PortalTrace, PortalTransaction};

fn hex_or_zero(v: Option<&Value>) -> String {
    crate::hex::parse_quantity(v.unwrap_or(&Value::Null))
        .ok()
        .flatten()
        .map(|n| crate::hex::quantity_hex(Some(&n)))
        .unwrap_or_else(|| "0x0".to_string())
}

fn hex_if_set(v: Option<&Value>) -> Option<Value> {
    v.and_then(|v| crate::hex::parse_quantity(v).ok().flatten())
        .map(|n| Value::String(crate::hex::quantity_hex(Some(&n))))
}

fn nonce_hex(nonce: Option<&Value>) -> String {
    match nonce {
        Some(Value::String(s)) if s.starts_with("0x") => s.clone(),
        other => crate::hex::parse_quantity(other.unwrap_or(&Value::Null))
            .ok()
            .flatten()
            .map(|n| format!("0x{:0>16}", n.to_str_radix(16)))
            .unwrap_or_else(|| "0x0000000000000000".to_string()),
    }
}

/// Shapes a decoded block, embedding fully-shaped transactions when
/// `full_tx` is set, otherwise transaction hashes only.
pub fn shape_block(block: &PortalBlock, full_tx: bool, uncles: Vec<Value>) -> Value {
    let h = &block.header;
    let mut out = Map::new();
    out.insert("number".to_string(), json!(u64_hex(h.number)));
    out.insert("hash".to_string(), json!(h.hash));
    out.insert("parentHash".to_string(), json!(h.parent_hash));
    out.insert("timestamp".to_string(), json!(hex_or_zero(h.timestamp.map(|t| json!(t)).as_ref())));
    out.insert("miner".to_string(), json!(h.miner));
    out.insert("gasUsed".to_string(), json!(hex_or_zero(h.gas_used.as_ref())));
    out.insert("gasLimit".to_string(), json!(hex_or_zero(h.gas_limit.as_ref())));
    out.insert("nonce".to_string(), json!(nonce_hex(h.nonce.as_ref())));
    out.insert("difficulty".to_string(), json!(hex_or_zero(h.difficulty.as_ref())));
    out.insert("size".to_string(), json!(hex_or_zero(h.size.as_ref())));
    out.insert("stateRoot".to_string(), json!(h.state_root));
    out.insert("transactionsRoot".to_string(), json!(h.transactions_root));
    out.insert("receiptsRoot".to_string(), json!(h.receipts_root));
    out.insert("logsBloom".to_string(), json!(h.logs_bloom));
    out.insert("extraData".to_string(), json!(h.extra_data));
    out.insert("mixHash".to_string(), json!(h.mix_hash));
    out.insert("sha3Uncles".to_string(), json!(h.sha3_uncles));

    if let Some(v) = hex_if_set(h.base_fee_per_gas.as_ref()) {
        out.insert("baseFeePerGas".to_string(), v);
    }
    if let Some(v) = h.total_difficulty.as_ref() {
        if !v.is_null() {
            out.insert("totalDifficulty".to_string(), json!(hex_or_zero(Some(v))));
        }
    }
    if let Some(v) = hex_if_set(h.blob_gas_used.as_ref()) {
        out.insert("blobGasUsed".to_string(), v);
    }
    if let Some(v) = hex_if_set(h.excess_blob_gas.as_ref()) {
        out.insert("excessBlobGas".to_string(), v);
    }
    if let Some(root) = &h.withdrawals_root {
        out.insert("withdrawalsRoot".to_string(), json!(root));
        out.insert("withdrawals".to_string(), json!(block.withdrawals));
    }
    if let Some(root) = &h.parent_beacon_block_root {
        out.insert("parentBeaconBlockRoot".to_string(), json!(root));
    }

    out.insert("uncles".to_string(), Value::Array(uncles));

    let transactions = if full_tx {
        block
            .transactions
            .iter()
            .map(|tx| shape_transaction(tx))
            .collect::<Vec<_>>()
    } else {
        block.transactions.iter().map(|tx| json!(tx.hash)).collect::<Vec<_>>()
    };
    out.insert("transactions".to_string(), Value::Array(transactions));

    Value::Object(out)
}

/// Shapes a single transaction.
pub fn shape_transaction(tx: &PortalTransaction) -> Value {
    let mut out = Map::new();
    out.insert("blockHash".to_string(), json!(tx.block_hash));
    out.insert("blockNumber".to_string(), json!(tx.block_number.map(u64_hex)));
    out.insert("transactionIndex".to_string(), json!(tx.transaction_index.map(u64_hex)));
    out.insert("hash".to_string(), json!(tx.hash));
    out.insert("from".to_string(), json!(tx.from));
    out.insert("to".to_string(), json!(tx.to));
    out.insert("value".to_string(), json!(hex_or_zero(tx.value.as_ref())));
    out.insert("input".to_string(), json!(tx.input));
    out.insert("nonce".to_string(), json!(nonce_hex(tx.nonce.as_ref())));
    out.insert("gas".to_string(), json!(hex_or_zero(tx.gas.as_ref())));
    if let Some(v) = hex_if_set(tx.r#type.as_ref()) {
        out.insert("type".to_string(), v);
    }
    if let Some(v) = hex_if_set(tx.gas_price.as_ref()) {
        out.insert("gasPrice".to_string(), v);
    }
    if let Some(v) = hex_if_set(tx.max_fee_per_gas.as_ref()) {
        out.insert("maxFeePerGas".to_string(), v);
    }
    if let Some(v) = hex_if_set(tx.max_priority_fee_per_gas.as_ref()) {
        out.insert("maxPriorityFeePerGas".to_string(), v);
    }
    if let Some(v) = hex_if_set(tx.chain_id.as_ref()) {
        out.insert("chainId".to_string(), v);
    }
    if let Some(v) = hex_if_set(tx.y_parity.as_ref()) {
        out.insert("yParity".to_string(), v);
    }
    if let Some(v) = tx.access_list.as_ref() {
        out.insert("accessList".to_string(), v.clone());
    }
    if let Some(v) = tx.authorization_list.as_ref() {
        out.insert("authorizationList".to_string(), v.clone());
    }
    if let Some(v) = hex_if_set(tx.max_fee_per_blob_gas.as_ref()) {
        out.insert("maxFeePerBlobGas".to_string(), v);
    }
    if let Some(v) = tx.blob_versioned_hashes.as_ref() {
        out.insert("blobVersionedHashes".to_string(), json!(v));
    }
    if let Some(v) = tx.v.as_ref() {
        out.insert("v".to_string(), v.clone());
    }
    if let Some(v) = tx.r.as_ref() {
        out.insert("r".to_string(), v.clone());
    }
    if let Some(v) = tx.s.as_ref() {
        out.insert("s".to_string(), v.clone());
    }
    Value::Object(out)
}

/// Shapes a single log entry.
pub fn shape_log(log: &PortalLog) -> Value {
    json!({
        "blockHash": log.block_hash,
        "blockNumber": log.block_number.map(u64_hex),
        "transactionIndex": log.transaction_index.map(u64_hex),
        "transactionHash": log.transaction_hash,
        "logIndex": u64_hex(log.log_index),
        "address": log.address,
        "data": log.data,
        "topics": log.topics,
        "removed": false,
    })
}

/// Shapes a single trace entry, merging the nested `action`/`result`
/// objects with their flat `call*`/`createResult*` fallback fields.
pub fn shape_trace(trace: &PortalTrace, transaction_hash: Option<&str>, transaction_position: Option<u64>) -> Value {
    let mut action = Map::new();
    let a = trace.action.as_ref();

    let from = a.and_then(|a| a.from.clone()).or_else(|| trace.call_from.clone());
    let to = a.and_then(|a| a.to.clone()).or_else(|| trace.call_to.clone());
    let value = a.and_then(|a| a.value.clone()).or_else(|| trace.call_value.clone());
    let gas = a.and_then(|a| a.gas.clone()).or_else(|| trace.call_gas.clone());
    let input = a.and_then(|a| a.input.clone()).or_else(|| trace.call_input.clone());
    let call_type = a.and_then(|a| a.call_type.clone()).or_else(|| trace.call_type.clone());
    let init = a.and_then(|a| a.init.clone()).or_else(|| trace.call_init.clone());
    let address = a.and_then(|a| a.address.clone()).or_else(|| trace.call_address.clone());
    let balance = a.and_then(|a| a.balance.clone()).or_else(|| trace.call_balance.clone());
    let refund_address = a.and_then(|a| a.refund_address.clone()).or_else(|| trace.call_refund_address.clone());
    let author = a.and_then(|a| a.author.clone()).or_else(|| trace.call_author.clone());
    let reward_type = a.and_then(|a| a.reward_type.clone()).or_else(|| trace.call_reward_type.clone());

    if let Some(v) = from {
        action.insert("from".to_string(), json!(v));
    }
    if let Some(v) = to {
        action.insert("to".to_string(), json!(v));
    }
    if let Some(v) = value {
        action.insert("value".to_string(), v);
    }
    if let Some(v) = gas {
        action.insert("gas".to_string(), v);
    }
    if let Some(v) = input {
        action.insert("input".to_string(), json!(v));
    }
    if let Some(v) = call_type {
        action.insert("callType".to_string(), json!(v));
    }
    if let Some(v) = init {
        action.insert("init".to_string(), json!(v));
    }
    if let Some(v) = address {
        action.insert("address".to_string(), json!(v));
    }
    if let Some(v) = balance {
        action.insert("balance".to_string(), v);
    }
    if let Some(v) = refund_address {
        action.insert("refundAddress".to_string(), json!(v));
    }
    if let Some(v) = author {
        action.insert("author".to_string(), json!(v));
    }
    if let Some(v) = reward_type {
        action.insert("rewardType".to_string(), json!(v));
    }

    let mut out = Map::new();
    out.insert("action".to_string(), Value::Object(action));
    if let Some(t) = &trace.r#type {
        out.insert("type".to_string(), json!(t));
    }
    if let Some(ta) = &trace.trace_address {
        out.insert("traceAddress".to_string(), json!(ta));
    }
    if let Some(s) = trace.subtraces {
        out.insert("subtraces".to_string(), json!(s));
    }

    if let Some(error) = &trace.error {
        out.insert("error".to_string(), json!(error));
    } else {
        let r = trace.result.as_ref();
        let gas_used = r.and_then(|r| r.gas_used.clone()).or_else(|| {
            trace.call_result_gas_used.clone().or_else(|| trace.create_result_gas_used.clone())
        });
        let output = r.and_then(|r| r.output.clone()).or_else(|| trace.call_result_output.clone());
        let result_address = r
            .and_then(|r| r.address.clone())
            .or_else(|| trace.create_result_address.clone());
        let code = r.and_then(|r| r.code.clone()).or_else(|| trace.create_result_code.clone());

        let mut result = Map::new();
        if let Some(v) = gas_used {
            result.insert("gasUsed".to_string(), v);
        }
        if let Some(v) = output {
            result.insert("output".to_string(), json!(v));
        }
        if let Some(v) = result_address {
            result.insert("address".to_string(), json!(v));
        }
        if let Some(v) = code {
            result.insert("code".to_string(), json!(v));
        }
        if !result.is_empty() {
            out.insert("result".to_string(), Value::Object(result));
        }
    }

    if let Some(reason) = &trace.revert_reason {
        out.insert("revertReason".to_string(), json!(reason));
    }

    let tx_hash = trace.transaction_hash.clone().or_else(|| transaction_hash.map(String::from));
    if let Some(h) = tx_hash {
        out.insert("transactionHash".to_string(), json!(h));
    }
    let tx_pos = trace.transaction_position.or(transaction_position);
    if let Some(p) = tx_pos {
        out.insert("transactionPosition".to_string(), json!(p));
    }

    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::PortalBlockHeader;

    fn header() -> PortalBlockHeader {
        PortalBlockHeader {
            number: 100,
            hash: "0xblock".to_string(),
            parent_hash: Some("0xparent".to_string()),
            timestamp: Some(1_700_000_000),
            miner: Some("0xminer".to_string()),
            gas_used: Some(json!(21000)),
            gas_limit: Some(json!(30_000_000u64)),
            nonce: None,
            difficulty: Some(json!(0)),
            total_difficulty: None,
            size: Some(json!(1000)),
            state_root: Some("0xstate".to_string()),
            transactions_root: Some("0xtxroot".to_string()),
            receipts_root: Some("0xreceipts".to_string()),
            logs_bloom: Some("0x0".to_string()),
            extra_data: Some("0x".to_string()),
            mix_hash: Some("0xmix".to_string()),
            sha3_uncles: Some("0xuncles".to_string()),
            base_fee_per_gas: Some(json!(1_000_000_000u64)),
            blob_gas_used: None,
            excess_blob_gas: None,
            withdrawals_root: None,
            parent_beacon_block_root: None,
        }
    }

    #[test]
    fn block_shapes_quantities_as_hex() {
        let block = PortalBlock {
            header: header(),
            transactions: vec![],
            logs: vec![],
            traces: vec![],
            state_diffs: vec![],
            withdrawals: vec![],
        };
        let shaped = shape_block(&block, false, vec![]);
        assert_eq!(shaped["number"], json!("0x64"));
        assert_eq!(shaped["gasUsed"], json!("0x5208"));
        assert_eq!(shaped["uncles"], json!([]));
        assert!(shaped.get("totalDifficulty").is_none());
    }

    #[test]
    fn block_omits_absent_base_fee() {
        let mut h = header();
        h.base_fee_per_gas = None;
        let block = PortalBlock {
            header: h,
            transactions: vec![],
            logs: vec![],
            traces: vec![],
            state_diffs: vec![],
            withdrawals: vec![],
        };
        let shaped = shape_block(&block, false, vec![]);
        assert!(shaped.get("baseFeePerGas").is_none());
    }

    #[test]
    fn block_includes_withdrawals_when_root_present() {
        let mut h = header();
        h.withdrawals_root = Some("0xwroot".to_string());
        let block = PortalBlock {
            header: h,
            transactions: vec![],
            logs: vec![],
            traces: vec![],
            state_diffs: vec![],
            withdrawals: vec![json!({"index": "0x1"})],
        };
        let shaped = shape_block(&block, false, vec![]);
        assert_eq!(shaped["withdrawalsRoot"], json!("0xwroot"));
        assert_eq!(shaped["withdrawals"], json!([{"index": "0x1"}]));
    }

    fn transaction() -> PortalTransaction {
        PortalTransaction {
            hash: "0xtx".to_string(),
            block_hash: Some("0xblock".to_string()),
            block_number: Some(100),
            transaction_index: Some(0),
            from: Some("0xfrom".to_string()),
            to: Some("0xto".to_string()),
            value: Some(json!(0)),
            input: Some("0x".to_string()),
            nonce: Some(json!(5)),
            gas: Some(json!(21000)),
            r#type: Some(json!(2)),
            gas_price: None,
            max_fee_per_gas: Some(json!(1_000_000_000u64)),
            max_priority_fee_per_gas: Some(json!(1_000_000u64)),
            chain_id: Some(json!(1)),
            y_parity: Some(json!(1)),
            access_list: Some(json!([])),
            authorization_list: None,
            max_fee_per_blob_gas: None,
            blob_versioned_hashes: None,
            v: Some(json!("0x0")),
            r: Some(json!("0x1")),
            s: Some(json!("0x1")),
        }
    }

    #[test]
    fn transaction_preserves_signature_fields_verbatim() {
        let shaped = shape_transaction(&transaction());
        assert_eq!(shaped["v"], json!("0x0"));
        assert_eq!(shaped["type"], json!("0x2"));
        assert!(shaped.get("gasPrice").is_none());
    }

    #[test]
    fn contract_creation_has_null_to() {
        let mut tx = transaction();
        tx.to = None;
        let shaped = shape_transaction(&tx);
        assert!(shaped["to"].is_null());
    }

    #[test]
    fn log_shapes_indices_as_hex_and_removed_false() {
        let log = PortalLog {
            block_hash: Some("0xblock".to_string()),
            block_number: Some(100),
            transaction_index: Some(0),
            transaction_hash: "0xtx".to_string(),
            log_index: 3,
            address: "0xaddr".to_string(),
            data: "0x".to_string(),
            topics: vec!["0xtopic".to_string()],
        };
        let shaped = shape_log(&log);
        assert_eq!(shaped["logIndex"], json!("0x3"));
        assert_eq!(shaped["removed"], json!(false));
    }

    #[test]
    fn trace_fills_action_from_flat_call_fields() {
        let trace = PortalTrace {
            block_number: Some(100),
            block_hash: Some("0xblock".to_string()),
            transaction_hash: None,
            transaction_position: None,
            r#type: Some("call".to_string()),
            trace_address: Some(vec![]),
            subtraces: Some(0),
            action: None,
            result: None,
            error: None,
            revert_reason: None,
            call_from: Some("0xfrom".to_string()),
            call_to: Some("0xto".to_string()),
            call_value: Some(json!(0)),
            call_gas: Some(json!(21000)),
            call_input: Some("0x".to_string()),
            call_type: Some("call".to_string()),
            call_init: None,
            call_address: None,
            call_balance: None,
            call_refund_address: None,
            call_author: None,
            call_reward_type: None,
            call_result_gas_used: Some(json!(21000)),
            call_result_output: Some("0x".to_string()),
            create_result_gas_used: None,
            create_result_code: None,
            create_result_address: None,
        };
        let shaped = shape_trace(&trace, Some("0xtx"), Some(0));
        assert_eq!(shaped["action"]["from"], json!("0xfrom"));
        assert_eq!(shaped["result"]["gasUsed"], json!(21000));
        assert_eq!(shaped["transactionHash"], json!("0xtx"));
    }

    #[test]
    fn trace_omits_result_when_error_present() {
        let mut trace_json = shape_trace(
            &PortalTrace {
                block_number: None,
                block_hash: None,
                transaction_hash: None,
                transaction_position: None,
                r#type: Some("call".to_string()),
                trace_address: Some(vec![]),
                subtraces: Some(0),
                action: None,
                result: None,
                error: Some("execution reverted".to_string()),
                revert_reason: Some("reverted".to_string()),
                call_from: None,
                call_to: None,
                call_value: None,
                call_gas: None,
                call_input: None,
                call_type: None,
                call_init: None,
                call_address: None,
                call_balance: None,
                call_refund_address: None,
                call_author: None,
                call_reward_type: None,
                call_result_gas_used: None,
                call_result_output: None,
                create_result_gas_used: None,
                create_result_code: None,
                create_result_address: None,
            },
            None,
            None,
        );
        assert!(trace_json.as_object_mut().unwrap().remove("result").is_none());
        assert_eq!(trace_json["error"], json!("execution reverted"));
    }
}

//! Portal wire types: the range-request shape Portal
//! accepts and the block/transaction/log/trace records it returns. These are
//! typed records with optional fields rather than ambient JSON, per the
//! with optional fields, so unknown or absent wire data never panics a handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn is_false(b: &bool) -> bool {
    !*b
}

macro_rules! field_selection {
    ($name:ident { $($field:ident),* $(,)? }) => {
        #[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            $(
                #[serde(default, skip_serializing_if = "is_false")]
                pub $field: bool,
            )*
        }

        impl $name {
            pub fn all() -> Self {
                Self { $($field: true),* }
            }

            pub fn none() -> Self {
                Self::default()
            }
        }
    };
}

field_selection!(BlockFields {
    number, hash, parent_hash, timestamp, miner, gas_used, gas_limit, nonce, difficulty,
    total_difficulty, size, state_root, transactions_root, receipts_root, logs_bloom,
    extra_data, mix_hash, sha3_uncles, base_fee_per_gas, blob_gas_used, excess_blob_gas,
    withdrawals_root, parent_beacon_block_root, withdrawals,
});

impl BlockFields {
    /// The minimum a block-yielding request always needs:
    /// "block, if requested, has number and hash included."
    pub fn minimal() -> Self {
        Self { number: true, hash: true, ..Self::none() }
    }

    /// number, hash, parentHash, timestamp — used by handlers that only need
    /// to correlate transactions/traces to their containing block.
    pub fn correlation() -> Self {
        Self { number: true, hash: true, parent_hash: true, timestamp: true, ..Self::none() }
    }
}

field_selection!(TransactionFields {
    hash, block_hash, block_number, transaction_index, from, to, value, input, nonce, gas,
    r#type, gas_price, max_fee_per_gas, max_priority_fee_per_gas, chain_id, y_parity,
    access_list, authorization_list, max_fee_per_blob_gas, blob_versioned_hashes, v, r, s,
});

impl TransactionFields {
    pub fn hash_only() -> Self {
        Self { hash: true, ..Self::none() }
    }
}

field_selection!(LogFields {
    block_hash, block_number, transaction_index, transaction_hash, log_index, address, data,
    topics,
});

field_selection!(TraceFields {
    trace_address,
    r#type,
    subtraces,
    error,
    revert_reason,
    call_from,
    call_to,
    call_value,
    call_gas,
    call_input,
    call_type,
    call_init,
    call_address,
    call_balance,
    call_refund_address,
    call_author,
    call_reward_type,
    call_result_gas_used,
    call_result_output,
    create_result_gas_used,
    create_result_code,
    create_result_address,
});

field_selection!(StateDiffFields { address, kind, prev, next });

/// Field selection for one range request: a bitmap per entity kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSelection {
    pub block: BlockFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_diff: Option<StateDiffFields>,
}

impl FieldSelection {
    /// Clears a negotiable field by its wire (camelCase) name across every
    /// entity kind that declares it, so a retried request omits it.
    pub fn strip_negotiable_field(&mut self, name: &str) {
        if name == "authorizationList" {
            if let Some(t) = self.transaction.as_mut() {
                t.authorization_list = false;
            }
        }
    }
}

/// An item of a `logs`/`transactions`/`traces` filter array. An empty object
/// matches everything of that kind within the range.
pub type FilterSelector = serde_json::Map<String, Value>;

/// A Portal range request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeRequest {
    pub r#type: &'static str,
    pub from_block: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_block: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_all_blocks: bool,
    pub fields: FieldSelection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<FilterSelector>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<FilterSelector>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces: Option<Vec<FilterSelector>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_diffs: Option<Vec<FilterSelector>>,
}

impl RangeRequest {
    pub fn new(from_block: u64, to_block: Option<u64>, fields: FieldSelection) -> Self {
        Self {
            r#type: "evm",
            from_block,
            to_block,
            include_all_blocks: false,
            fields,
            logs: None,
            transactions: None,
            traces: None,
            state_diffs: None,
        }
    }

    /// Whether this request requires contiguous block coverage per spec
    /// §4.3: declares a finite `toBlock` AND (`includeAllBlocks` OR is not a
    /// logs-only filter).
    pub fn requires_continuity(&self) -> bool {
        self.to_block.is_some()
            && (self.include_all_blocks || self.transactions.is_some() || self.traces.is_some())
    }

    /// Builds a resume request for a stream that stalled before covering its
    /// range: same filters/fields/finality, starting at `from_block`.
    pub fn clone_for_resume(&self, from_block: u64) -> Self {
        Self { from_block, ..self.clone() }
    }
}

/// A decoded block record from the NDJSON stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalBlock {
    pub header: PortalBlockHeader,
    #[serde(default)]
    pub transactions: Vec<PortalTransaction>,
    #[serde(default)]
    pub logs: Vec<PortalLog>,
    #[serde(default)]
    pub traces: Vec<PortalTrace>,
    #[serde(default)]
    pub state_diffs: Vec<Value>,
    #[serde(default)]
    pub withdrawals: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalBlockHeader {
    pub number: u64,
    pub hash: String,
    #[serde(default)]
    pub parent_hash: Option<String>,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub miner: Option<String>,
    #[serde(default)]
    pub gas_used: Option<Value>,
    #[serde(default)]
    pub gas_limit: Option<Value>,
    #[serde(default)]
    pub nonce: Option<Value>,
    #[serde(default)]
    pub difficulty: Option<Value>,
    #[serde(default)]
    pub total_difficulty: Option<Value>,
    #[serde(default)]
    pub size: Option<Value>,
    #[serde(default)]
    pub state_root: Option<String>,
    #[serde(default)]
    pub transactions_root: Option<String>,
    #[serde(default)]
    pub receipts_root: Option<String>,
    #[serde(default)]
    pub logs_bloom: Option<String>,
    #[serde(default)]
    pub extra_data: Option<String>,
    #[serde(default)]
    pub mix_hash: Option<String>,
    #[serde(default)]
    pub sha3_uncles: Option<String>,
    #[serde(default)]
    pub base_fee_per_gas: Option<Value>,
    #[serde(default)]
    pub blob_gas_used: Option<Value>,
    #[serde(default)]
    pub excess_blob_gas: Option<Value>,
    #[serde(default)]
    pub withdrawals_root: Option<String>,
    #[serde(default)]
    pub parent_beacon_block_root: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalTransaction {
    pub hash: String,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub transaction_index: Option<u64>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub nonce: Option<Value>,
    #[serde(default)]
    pub gas: Option<Value>,
    #[serde(default)]
    pub r#type: Option<Value>,
    #[serde(default)]
    pub gas_price: Option<Value>,
    #[serde(default)]
    pub max_fee_per_gas: Option<Value>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<Value>,
    #[serde(default)]
    pub chain_id: Option<Value>,
    #[serde(default)]
    pub y_parity: Option<Value>,
    #[serde(default)]
    pub access_list: Option<Value>,
    #[serde(default)]
    pub authorization_list: Option<Value>,
    #[serde(default)]
    pub max_fee_per_blob_gas: Option<Value>,
    #[serde(default)]
    pub blob_versioned_hashes: Option<Vec<String>>,
    #[serde(default)]
    pub v: Option<Value>,
    #[serde(default)]
    pub r: Option<Value>,
    #[serde(default)]
    pub s: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalLog {
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub transaction_index: Option<u64>,
    pub transaction_hash: String,
    pub log_index: u64,
    pub address: String,
    pub data: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalTraceAction {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub gas: Option<Value>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub call_type: Option<String>,
    #[serde(default)]
    pub init: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub balance: Option<Value>,
    #[serde(default)]
    pub refund_address: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub reward_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalTraceResult {
    #[serde(default)]
    pub gas_used: Option<Value>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalTrace {
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub transaction_position: Option<u64>,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub trace_address: Option<Vec<u64>>,
    #[serde(default)]
    pub subtraces: Option<u64>,
    #[serde(default)]
    pub action: Option<PortalTraceAction>,
    #[serde(default)]
    pub result: Option<PortalTraceResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub revert_reason: Option<String>,

    // flat fields, filled into `action`/`result` iff the corresponding key is unset.
    #[serde(default)]
    pub call_from: Option<String>,
    #[serde(default)]
    pub call_to: Option<String>,
    #[serde(default)]
    pub call_value: Option<Value>,
    #[serde(default)]
    pub call_gas: Option<Value>,
    #[serde(default)]
    pub call_input: Option<String>,
    #[serde(default)]
    pub call_type: Option<String>,
    #[serde(default)]
    pub call_init: Option<String>,
    #[serde(default)]
    pub call_address: Option<String>,
    #[serde(default)]
    pub call_balance: Option<Value>,
    #[serde(default)]
    pub call_refund_address: Option<String>,
    #[serde(default)]
    pub call_author: Option<String>,
    #[serde(default)]
    pub call_reward_type: Option<String>,
    #[serde(default)]
    pub call_result_gas_used: Option<Value>,
    #[serde(default)]
    pub call_result_output: Option<String>,
    #[serde(default)]
    pub create_result_gas_used: Option<Value>,
    #[serde(default)]
    pub create_result_code: Option<String>,
    #[serde(default)]
    pub create_result_address: Option<String>,
}

/// Portal `/head` and `/finalized-head` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalHead {
    pub number: u64,
    pub hash: String,
}

/// Result of a `head()` call, carrying whether the finalized endpoint served it.
#[derive(Debug, Clone)]
pub struct HeadResult {
    pub number: u64,
    pub hash: String,
    pub finalized_available: bool,
}

/// Portal `/metadata` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalMetadata {
    pub dataset: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub real_time: bool,
    #[serde(default)]
    pub start_block: Option<u64>,
}

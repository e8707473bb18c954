//! Validator (C4): parses block tags, transaction indices, and log filters,
//! enforcing the configured range and address limits.

use async_trait::async_trait;
use num_traits::ToPrimitive;
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::GatewayError;
use crate::hex::parse_quantity;
use crate::portal::HeadResult;

/// Abstraction over the Portal `head`/`finalized-head` lookups the validator
/// needs, so `gateway-core` doesn't depend on the reqwest-based client in
/// `gateway-portal`.
#[async_trait]
pub trait HeadSource: Send + Sync {
    async fn head(&self, base_url: &str, finalized: bool) -> Result<HeadResult, GatewayError>;
}

/// A resolved block tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTag {
    pub number: u64,
    pub use_finalized: bool,
}

/// Parses a block tag. `value` is the raw JSON-RPC parameter:
/// a tag string (`"latest"`, `"finalized"`, `"safe"`, `"earliest"`,
/// `"pending"`), a hex/decimal block number string, or a JSON integer.
pub async fn parse_block_number(
    head_source: &dyn HeadSource,
    base_url: &str,
    value: &Value,
    cfg: &Config,
) -> Result<BlockTag, GatewayError> {
    let tag = match value {
        Value::String(s) => s.as_str(),
        Value::Null => "latest",
        _ => {
            return parse_block_number_literal(value, cfg);
        }
    };

    match tag {
        "" | "latest" => {
            let head = head_source.head(base_url, false).await?;
            Ok(BlockTag { number: head.number, use_finalized: false })
        }
        "finalized" | "safe" => {
            let head = head_source.head(base_url, true).await?;
            Ok(BlockTag { number: head.number, use_finalized: head.finalized_available })
        }
        "earliest" => Ok(BlockTag { number: 0, use_finalized: false }),
        "pending" => Err(GatewayError::pending_not_found()),
        _ => parse_block_number_literal(value, cfg),
    }
}

fn parse_block_number_literal(value: &Value, cfg: &Config) -> Result<BlockTag, GatewayError> {
    let n = parse_quantity(value)?.ok_or_else(|| GatewayError::invalid_block_number("empty"))?;
    let n: u64 = n
        .to_u64()
        .ok_or_else(|| GatewayError::invalid_block_number("block number out of range"))?;
    if n > cfg.max_block_number {
        return Err(GatewayError::invalid_block_number(format!(
            "{n} exceeds maximum block number {}",
            cfg.max_block_number
        )));
    }
    Ok(BlockTag { number: n, use_finalized: false })
}

/// Parses a transaction index: a non-negative hex or decimal integer.
pub fn parse_transaction_index(value: &Value) -> Result<u64, GatewayError> {
    let n = parse_quantity(value)?.ok_or_else(|| GatewayError::invalid_transaction_index("missing"))?;
    n.to_u64().ok_or_else(|| GatewayError::invalid_transaction_index("out of range"))
}

/// Raw `eth_getLogs` filter parameter as received over the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogFilter {
    #[serde(default)]
    pub from_block: Option<Value>,
    #[serde(default)]
    pub to_block: Option<Value>,
    #[serde(default)]
    pub address: Option<Value>,
    #[serde(default)]
    pub topics: Option<Vec<Value>>,
    #[serde(default)]
    pub block_hash: Option<String>,
}

/// A normalized, validated `eth_getLogs` filter.
#[derive(Debug, Clone)]
pub struct ParsedLogFilter {
    pub from_block: u64,
    pub to_block: u64,
    pub use_finalized: bool,
    pub addresses: Vec<String>,
    /// Up to 4 topic-position slots. `None` is a wildcard; `Some(set)` means
    /// "any topic in this set at this position".
    pub topics: Vec<Option<Vec<String>>>,
}

/// Outcome of parsing a log filter: either a Portal-servable range filter,
/// or a blockHash filter that bypasses Portal entirely.
pub enum LogFilterResolution {
    Range(ParsedLogFilter),
    BlockHash(String),
}

/// Parses and validates an `eth_getLogs` filter.
pub async fn parse_log_filter(
    head_source: &dyn HeadSource,
    base_url: &str,
    filter: RawLogFilter,
    cfg: &Config,
) -> Result<LogFilterResolution, GatewayError> {
    if let Some(block_hash) = filter.block_hash {
        if filter.from_block.is_some() || filter.to_block.is_some() {
            return Err(GatewayError::InvalidParams(
                "blockHash is mutually exclusive with fromBlock/toBlock".to_string(),
            ));
        }
        return Ok(LogFilterResolution::BlockHash(block_hash));
    }

    let to_tag = match &filter.to_block {
        Some(v) => parse_block_number(head_source, base_url, v, cfg).await?,
        None => {
            let head = head_source.head(base_url, false).await?;
            BlockTag { number: head.number, use_finalized: false }
        }
    };

    let from_tag = match &filter.from_block {
        Some(v) => parse_block_number(head_source, base_url, v, cfg).await?,
        None => to_tag,
    };

    if from_tag.number > to_tag.number {
        return Err(GatewayError::invalid_block_range());
    }

    let range = to_tag.number - from_tag.number + 1;
    if range > cfg.max_log_block_range {
        return Err(GatewayError::RangeTooLarge { max: cfg.max_log_block_range });
    }

    let addresses = parse_addresses(filter.address.as_ref(), cfg)?;
    let topics = parse_topics(filter.topics)?;

    Ok(LogFilterResolution::Range(ParsedLogFilter {
        from_block: from_tag.number,
        to_block: to_tag.number,
        use_finalized: to_tag.use_finalized,
        addresses,
        topics,
    }))
}

fn parse_addresses(address: Option<&Value>, cfg: &Config) -> Result<Vec<String>, GatewayError> {
    let raw: Vec<Value> = match address {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => vec![Value::String(s.clone())],
        Some(Value::Array(v)) => v.clone(),
        Some(other) => {
            return Err(GatewayError::InvalidParams(format!("invalid address filter: {other}")))
        }
    };
    if raw.len() > cfg.max_log_addresses {
        return Err(GatewayError::TooManyAddresses);
    }
    raw.iter()
        .map(|v| match v {
            Value::String(s) => crate::hex::hex_bytes("address", s, 20),
            other => Err(GatewayError::InvalidParams(format!("invalid address: {other}"))),
        })
        .collect()
}

fn parse_topics(topics: Option<Vec<Value>>) -> Result<Vec<Option<Vec<String>>>, GatewayError> {
    let topics = match topics {
        None => return Ok(Vec::new()),
        Some(t) => t,
    };
    if topics.len() > 4 {
        return Err(GatewayError::InvalidParams("topics array may have at most 4 positions".to_string()));
    }
    topics
        .into_iter()
        .map(|slot| match slot {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(vec![crate::hex::hex_bytes("topic", &s, 32)?])),
            Value::Array(values) => {
                let set = values
                    .into_iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::String(s) => crate::hex::hex_bytes("topic", &s, 32).map(Some),
                        other => Err(GatewayError::InvalidParams(format!("invalid topic: {other}"))),
                    })
                    .collect::<Result<Vec<Option<String>>, GatewayError>>()?;
                Ok(Some(set.into_iter().flatten().collect()))
            }
            other => Err(GatewayError::InvalidParams(format!("invalid topic slot: {other}"))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    struct FakeHeads {
        latest: HeadResult,
        finalized: HeadResult,
    }

    #[async_trait]
    impl HeadSource for FakeHeads {
        async fn head(&self, _base_url: &str, finalized: bool) -> Result<HeadResult, GatewayError> {
            Ok(if finalized { self.finalized.clone() } else { self.latest.clone() })
        }
    }

    fn cfg() -> Config {
        Config {
            service_mode: crate::config::ServiceMode::Single,
            listen_addr: "0.0.0.0:8080".to_string(),
            portal_base_url: "https://portal.example".to_string(),
            portal_api_key: None,
            portal_api_key_header: "X-API-Key".to_string(),
            portal_dataset: Some("ethereum-mainnet".to_string()),
            portal_dataset_map: HashMap::new(),
            portal_use_default_datasets: true,
            portal_chain_id: Some(1),
            portal_realtime_mode: crate::config::RealtimeMode::Auto,
            portal_metadata_ttl: Duration::from_secs(30),
            portal_include_all_blocks: false,
            portal_negotiable_fields: vec![],
            portal_max_concurrency: 20,
            max_log_block_range: 10,
            max_log_addresses: 2,
            max_block_number: 9_007_199_254_740_991,
            http_timeout: Duration::from_secs(60),
            handler_timeout: Duration::from_secs(30),
            max_concurrent_requests: 256,
            max_ndjson_line_bytes: 1024,
            max_ndjson_bytes: 1024 * 1024,
            max_request_body_bytes: 1024 * 1024,
            wrapper_api_key: None,
            wrapper_api_key_header: "X-API-Key".to_string(),
            upstream_rpc_url: None,
            upstream_rpc_url_map: HashMap::new(),
            upstream_methods_enabled: false,
        }
    }

    fn heads() -> FakeHeads {
        FakeHeads {
            latest: HeadResult { number: 100, hash: "0xlatest".to_string(), finalized_available: false },
            finalized: HeadResult { number: 90, hash: "0xfinal".to_string(), finalized_available: true },
        }
    }

    #[tokio::test]
    async fn latest_never_uses_finalized() {
        let tag = parse_block_number(&heads(), "u", &Value::String("latest".to_string()), &cfg())
            .await
            .unwrap();
        assert_eq!(tag, BlockTag { number: 100, use_finalized: false });
    }

    #[tokio::test]
    async fn finalized_reflects_availability() {
        let tag = parse_block_number(&heads(), "u", &Value::String("finalized".to_string()), &cfg())
            .await
            .unwrap();
        assert_eq!(tag, BlockTag { number: 90, use_finalized: true });
    }

    #[tokio::test]
    async fn pending_always_errors() {
        let err = parse_block_number(&heads(), "u", &Value::String("pending".to_string()), &cfg())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("pending block not found"));
    }

    #[tokio::test]
    async fn earliest_is_block_zero() {
        let tag = parse_block_number(&heads(), "u", &Value::String("earliest".to_string()), &cfg())
            .await
            .unwrap();
        assert_eq!(tag, BlockTag { number: 0, use_finalized: false });
    }

    #[test]
    fn transaction_index_accepts_hex_and_decimal() {
        assert_eq!(parse_transaction_index(&Value::String("0x5".to_string())).unwrap(), 5);
        assert_eq!(parse_transaction_index(&Value::String("5".to_string())).unwrap(), 5);
    }

    #[tokio::test]
    async fn log_filter_rejects_inverted_range() {
        let filter = RawLogFilter {
            from_block: Some(Value::String("0x5".to_string())),
            to_block: Some(Value::String("0x1".to_string())),
            ..Default::default()
        };
        let err = parse_log_filter(&heads(), "u", filter, &cfg()).await.unwrap_err();
        assert!(err.to_string().contains("invalid block range"));
    }

    #[tokio::test]
    async fn log_filter_from_only_defaults_to_to_latest_head() {
        let filter = RawLogFilter { from_block: Some(Value::String("0x5f".to_string())), ..Default::default() };
        let resolved = parse_log_filter(&heads(), "u", filter, &cfg()).await.unwrap();
        match resolved {
            LogFilterResolution::Range(r) => {
                assert_eq!(r.from_block, 95);
                assert_eq!(r.to_block, 100);
            }
            _ => panic!("expected range resolution"),
        }
    }

    #[tokio::test]
    async fn log_filter_rejects_oversized_range() {
        let filter = RawLogFilter {
            from_block: Some(Value::String("0x1".to_string())),
            to_block: Some(Value::String("0x64".to_string())),
            ..Default::default()
        };
        let err = parse_log_filter(&heads(), "u", filter, &cfg()).await.unwrap_err();
        assert!(err.to_string().contains("max block range"));
    }

    #[tokio::test]
    async fn log_filter_rejects_too_many_addresses() {
        let filter = RawLogFilter {
            from_block: Some(Value::String("0x1".to_string())),
            to_block: Some(Value::String("0x1".to_string())),
            address: Some(serde_json::json!(["0x".to_string() + &"11".repeat(20), "0x".to_string() + &"22".repeat(20), "0x".to_string() + &"33".repeat(20)])),
            ..Default::default()
        };
        let err = parse_log_filter(&heads(), "u", filter, &cfg()).await.unwrap_err();
        assert!(err.to_string().contains("specify less number of address") || matches!(err, GatewayError::TooManyAddresses));
    }

    #[tokio::test]
    async fn log_filter_normalizes_addresses_to_lowercase() {
        let addr_upper = "0x".to_string() + &"AB".repeat(20);
        let filter = RawLogFilter {
            from_block: Some(Value::String("0x1".to_string())),
            to_block: Some(Value::String("0x1".to_string())),
            address: Some(Value::String(addr_upper)),
            ..Default::default()
        };
        let resolved = parse_log_filter(&heads(), "u", filter, &cfg()).await.unwrap();
        match resolved {
            LogFilterResolution::Range(r) => {
                assert_eq!(r.addresses[0], "0x".to_string() + &"ab".repeat(20));
            }
            _ => panic!("expected range resolution"),
        }
    }

    #[tokio::test]
    async fn block_hash_filter_bypasses_portal() {
        let filter = RawLogFilter { block_hash: Some("0xabc".to_string()), ..Default::default() };
        let resolved = parse_log_filter(&heads(), "u", filter, &cfg()).await.unwrap();
        assert!(matches!(resolved, LogFilterResolution::BlockHash(h) if h == "0xabc"));
    }

    #[tokio::test]
    async fn block_hash_combined_with_range_is_rejected() {
        let filter = RawLogFilter {
            block_hash: Some("0xabc".to_string()),
            from_block: Some(Value::String("0x1".to_string())),
            ..Default::default()
        };
        assert!(parse_log_filter(&heads(), "u", filter, &cfg()).await.is_err());
    }
}

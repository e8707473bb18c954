//! Chain identity resolution: maps an EIP-155 chain id to a Portal
//! dataset name. Bijective for the lifetime of one request: resolution never
//! changes once a request picks a `(chain_id, dataset, base_url)` triple.
//!
//! The built-in default table is grounded on the dataset slugs SQD Portal
//! actually publishes for EVM chains; `PORTAL_DATASET_MAP` in configuration
//! overrides or extends it.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::config::{Config, ServiceMode};
use crate::error::GatewayError;

/// A single built-in `(chain_id, dataset)` pair.
#[derive(Debug, Clone, Copy)]
pub struct DefaultDataset {
    pub chain_id: i64,
    pub dataset: &'static str,
}

/// Built-in chain id -> Portal dataset slug table, used when
/// `PORTAL_USE_DEFAULT_DATASETS` is enabled (the default).
pub static DEFAULT_DATASETS: &[DefaultDataset] = &[
    DefaultDataset { chain_id: 1, dataset: "ethereum-mainnet" },
    DefaultDataset { chain_id: 137, dataset: "polygon-mainnet" },
    DefaultDataset { chain_id: 56, dataset: "binance-mainnet" },
    DefaultDataset { chain_id: 42161, dataset: "arbitrum-one" },
    DefaultDataset { chain_id: 204, dataset: "opbnb-mainnet" },
    DefaultDataset { chain_id: 8453, dataset: "base-mainnet" },
    DefaultDataset { chain_id: 10, dataset: "optimism-mainnet" },
    DefaultDataset { chain_id: 43114, dataset: "avalanche-mainnet" },
    DefaultDataset { chain_id: 5000, dataset: "mantle-mainnet" },
    DefaultDataset { chain_id: 100, dataset: "gnosis-mainnet" },
    DefaultDataset { chain_id: 59144, dataset: "linea-mainnet" },
    DefaultDataset { chain_id: 534352, dataset: "scroll-mainnet" },
    DefaultDataset { chain_id: 324, dataset: "zksync-mainnet" },
    DefaultDataset { chain_id: 81457, dataset: "blast-l2-mainnet" },
    DefaultDataset { chain_id: 42220, dataset: "celo-mainnet" },
];

static DEFAULT_BY_CHAIN_ID: LazyLock<HashMap<i64, &'static str>> =
    LazyLock::new(|| DEFAULT_DATASETS.iter().map(|d| (d.chain_id, d.dataset)).collect());

/// A resolved chain: the triple a request carries for its entire lifetime.
#[derive(Debug, Clone)]
pub struct ResolvedChain {
    pub chain_id: i64,
    pub dataset: String,
    pub portal_base_url: String,
}

/// Resolves the dataset for `chain_id`. In single-chain mode `chain_id` is
/// only used to validate it matches the configured chain; in multi-chain
/// mode it drives the lookup. `PORTAL_DATASET_MAP` takes precedence over the
/// built-in table; `PORTAL_DATASET` is the single-mode override.
pub fn resolve_chain(config: &Config, requested_chain_id: Option<i64>) -> Result<ResolvedChain, GatewayError> {
    let chain_id = match config.service_mode {
        ServiceMode::Single => {
            let configured = config
                .portal_chain_id
                .expect("single-mode config always carries portal_chain_id");
            if let Some(requested) = requested_chain_id {
                if requested != configured {
                    return Err(GatewayError::InvalidRequest(format!(
                        "chain {requested} not served by this endpoint"
                    )));
                }
            }
            configured
        }
        ServiceMode::Multi => requested_chain_id.ok_or_else(|| {
            GatewayError::InvalidRequest("X-Chain-Id header or path chain id is required".to_string())
        })?,
    };

    let dataset = if config.service_mode == ServiceMode::Single {
        config.portal_dataset.clone()
    } else {
        None
    }
    .or_else(|| config.portal_dataset_map.get(&chain_id).cloned())
    .or_else(|| {
        if config.portal_use_default_datasets {
            DEFAULT_BY_CHAIN_ID.get(&chain_id).map(|s| s.to_string())
        } else {
            None
        }
    })
    .ok_or_else(|| GatewayError::InvalidRequest(format!("chain {chain_id} has no known dataset")))?;

    Ok(ResolvedChain { chain_id, dataset, portal_base_url: config.portal_base_url.clone() })
}

/// Parses a chain id from a header value: decimal or `0x`-prefixed hex.
pub fn parse_chain_id_header(value: &str) -> Result<i64, GatewayError> {
    let value = value.trim();
    if let Some(stripped) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        i64::from_str_radix(stripped, 16)
            .map_err(|_| GatewayError::InvalidRequest(format!("invalid X-Chain-Id: {value}")))
    } else {
        value
            .parse::<i64>()
            .map_err(|_| GatewayError::InvalidRequest(format!("invalid X-Chain-Id: {value}")))
    }
}

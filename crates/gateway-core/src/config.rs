//! Process configuration. A single immutable struct populated once
//! from the environment at startup, following an `env::var(...)`
//! idiom in `crates/api/src/main.rs` and `crates/ingestion/src/lib.rs`.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeMode {
    Auto,
    Required,
    Disabled,
}

/// Immutable process configuration, built once in `main` via [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    pub service_mode: ServiceMode,
    pub listen_addr: String,

    pub portal_base_url: String,
    pub portal_api_key: Option<String>,
    pub portal_api_key_header: String,
    pub portal_dataset: Option<String>,
    pub portal_dataset_map: HashMap<i64, String>,
    pub portal_use_default_datasets: bool,
    pub portal_chain_id: Option<i64>,
    pub portal_realtime_mode: RealtimeMode,
    pub portal_metadata_ttl: Duration,
    pub portal_include_all_blocks: bool,
    pub portal_negotiable_fields: Vec<String>,
    pub portal_max_concurrency: usize,

    pub max_log_block_range: u64,
    pub max_log_addresses: usize,
    pub max_block_number: u64,

    pub http_timeout: Duration,
    pub handler_timeout: Duration,

    pub max_concurrent_requests: usize,

    pub max_ndjson_line_bytes: usize,
    pub max_ndjson_bytes: usize,
    pub max_request_body_bytes: usize,

    pub wrapper_api_key: Option<String>,
    pub wrapper_api_key_header: String,

    pub upstream_rpc_url: Option<String>,
    pub upstream_rpc_url_map: HashMap<i64, String>,
    pub upstream_methods_enabled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("invalid JSON for {name}: {source}")]
    InvalidJson { name: &'static str, source: serde_json::Error },
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env_string(key) {
        None => Ok(default),
        Some(v) => v.parse::<T>().map_err(|_| ConfigError::Invalid { name: key, value: v }),
    }
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env_string(key) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "TRUE" | "yes" => Ok(true),
            "0" | "false" | "FALSE" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid { name: key, value: v }),
        },
    }
}

fn env_chain_map(key: &'static str) -> Result<HashMap<i64, String>, ConfigError> {
    match env_string(key) {
        None => Ok(HashMap::new()),
        Some(raw) => {
            let parsed: HashMap<String, String> =
                serde_json::from_str(&raw).map_err(|source| ConfigError::InvalidJson { name: key, source })?;
            let mut out = HashMap::with_capacity(parsed.len());
            for (k, v) in parsed {
                let chain_id: i64 = k.parse().map_err(|_| ConfigError::Invalid { name: key, value: k })?;
                out.insert(chain_id, v);
            }
            Ok(out)
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let service_mode = match env_string("SERVICE_MODE").as_deref() {
            None | Some("single") => ServiceMode::Single,
            Some("multi") => ServiceMode::Multi,
            Some(other) => {
                return Err(ConfigError::Invalid { name: "SERVICE_MODE", value: other.to_string() })
            }
        };

        let listen_addr = env_string("SERVICE_LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let portal_base_url =
            env_string("PORTAL_BASE_URL").ok_or(ConfigError::Missing("PORTAL_BASE_URL"))?;

        let portal_realtime_mode = match env_string("PORTAL_REALTIME_MODE").as_deref() {
            None | Some("auto") => RealtimeMode::Auto,
            Some("required") => RealtimeMode::Required,
            Some("disabled") => RealtimeMode::Disabled,
            Some(other) => {
                return Err(ConfigError::Invalid { name: "PORTAL_REALTIME_MODE", value: other.to_string() })
            }
        };

        let portal_chain_id = match env_string("PORTAL_CHAIN_ID").or_else(|| env_string("CHAIN_ID")) {
            None => None,
            Some(v) => Some(
                v.parse::<i64>()
                    .map_err(|_| ConfigError::Invalid { name: "PORTAL_CHAIN_ID", value: v })?,
            ),
        };

        if service_mode == ServiceMode::Single && portal_chain_id.is_none() {
            return Err(ConfigError::Missing("PORTAL_CHAIN_ID"));
        }

        let portal_negotiable_fields = env_string("PORTAL_NEGOTIABLE_FIELDS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_else(|| vec!["authorizationList".to_string()]);

        Ok(Self {
            service_mode,
            listen_addr,
            portal_base_url,
            portal_api_key: env_string("PORTAL_API_KEY"),
            portal_api_key_header: env_string("PORTAL_API_KEY_HEADER")
                .unwrap_or_else(|| "X-API-Key".to_string()),
            portal_dataset: env_string("PORTAL_DATASET"),
            portal_dataset_map: env_chain_map("PORTAL_DATASET_MAP")?,
            portal_use_default_datasets: env_bool("PORTAL_USE_DEFAULT_DATASETS", true)?,
            portal_chain_id,
            portal_realtime_mode,
            portal_metadata_ttl: Duration::from_millis(env_parsed("PORTAL_METADATA_TTL_MS", 30_000)?),
            portal_include_all_blocks: env_bool("PORTAL_INCLUDE_ALL_BLOCKS", false)?,
            portal_negotiable_fields,
            portal_max_concurrency: env_parsed("PORTAL_MAX_CONCURRENCY", 20)?,

            max_log_block_range: env_parsed("MAX_LOG_BLOCK_RANGE", 10_000)?,
            max_log_addresses: env_parsed("MAX_LOG_ADDRESSES", 100)?,
            max_block_number: env_parsed("MAX_BLOCK_NUMBER", 9_007_199_254_740_991)?,

            http_timeout: Duration::from_millis(env_parsed("HTTP_TIMEOUT", 60_000)?),
            handler_timeout: Duration::from_millis(env_parsed("HANDLER_TIMEOUT_MS", 30_000)?),

            max_concurrent_requests: env_parsed("MAX_CONCURRENT_REQUESTS", 256)?,

            max_ndjson_line_bytes: env_parsed("MAX_NDJSON_LINE_BYTES", 8 * 1024 * 1024)?,
            max_ndjson_bytes: env_parsed("MAX_NDJSON_BYTES", 256 * 1024 * 1024)?,
            max_request_body_bytes: env_parsed("MAX_REQUEST_BODY_BYTES", 5 * 1024 * 1024)?,

            wrapper_api_key: env_string("WRAPPER_API_KEY"),
            wrapper_api_key_header: env_string("WRAPPER_API_KEY_HEADER")
                .unwrap_or_else(|| "X-API-Key".to_string()),

            upstream_rpc_url: env_string("UPSTREAM_RPC_URL"),
            upstream_rpc_url_map: env_chain_map("UPSTREAM_RPC_URL_MAP")?,
            upstream_methods_enabled: env_bool("UPSTREAM_METHODS_ENABLED", false)?,
        })
    }

    /// Resolves the upstream RPC URL for a chain: the
    /// per-chain map wins, then the global fallback.
    pub fn upstream_url_for(&self, chain_id: i64) -> Option<&str> {
        self.upstream_rpc_url_map
            .get(&chain_id)
            .map(String::as_str)
            .or(self.upstream_rpc_url.as_deref())
    }
}

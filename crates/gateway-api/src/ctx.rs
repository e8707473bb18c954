//! Per-request context (C7 "Per-request memoization"): the resolved chain,
//! the Portal/upstream clients, and memoized `head`/`metadata`/uncles lookups
//! shared across a batch's coalesced sub-batches and its individually
//! dispatched items. Built once per HTTP request and discarded with it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gateway_core::chains::ResolvedChain;
use gateway_core::config::Config;
use gateway_core::error::GatewayError;
use gateway_core::portal::{HeadResult, PortalMetadata};
use gateway_core::validate::HeadSource;
use gateway_portal::{PortalClient, StreamHeaderSink};
use gateway_upstream::UpstreamClient;
use serde_json::{json, Value};
use tokio::sync::{Mutex as AsyncMutex, OnceCell};

/// Collects the first non-empty `finalizedHeadNumber`/`finalizedHeadHash`
/// seen across every Portal stream call made for this request.
#[derive(Default)]
struct FinalizedHeadSink {
    number: Mutex<Option<String>>,
    hash: Mutex<Option<String>>,
}

impl StreamHeaderSink for FinalizedHeadSink {
    fn finalized_head_number(&self, value: &str) {
        let mut slot = self.number.lock().expect("finalized head sink poisoned");
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    fn finalized_head_hash(&self, value: &str) {
        let mut slot = self.hash.lock().expect("finalized head sink poisoned");
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }
}

pub struct RequestCtx {
    pub config: Arc<Config>,
    pub portal: Arc<PortalClient>,
    pub upstream: Arc<UpstreamClient>,
    pub chain: ResolvedChain,
    pub dataset_base_url: String,
    traceparent: Option<String>,
    head_memo: AsyncMutex<HashMap<bool, HeadResult>>,
    metadata_memo: OnceCell<Option<PortalMetadata>>,
    uncles_memo: AsyncMutex<HashMap<u64, Vec<Value>>>,
    head_sink: FinalizedHeadSink,
}

impl RequestCtx {
    pub fn new(
        config: Arc<Config>,
        portal: Arc<PortalClient>,
        upstream: Arc<UpstreamClient>,
        chain: ResolvedChain,
        traceparent: Option<String>,
    ) -> Self {
        let dataset_base_url = PortalClient::dataset_url(&chain.portal_base_url, &chain.dataset);
        Self {
            config,
            portal,
            upstream,
            chain,
            dataset_base_url,
            traceparent,
            head_memo: AsyncMutex::new(HashMap::new()),
            metadata_memo: OnceCell::new(),
            uncles_memo: AsyncMutex::new(HashMap::new()),
            head_sink: FinalizedHeadSink::default(),
        }
    }

    /// The inbound request's `traceparent` header, forwarded on every Portal
    /// call made on its behalf.
    pub fn traceparent(&self) -> Option<&str> {
        self.traceparent.as_deref()
    }

    /// Resolves the Portal head, memoized per (request, finalized-flag).
    pub async fn head(&self, finalized: bool) -> Result<HeadResult, GatewayError> {
        if let Some(head) = self.head_memo.lock().await.get(&finalized) {
            return Ok(head.clone());
        }
        let head = self.portal.head(&self.dataset_base_url, finalized, self.traceparent()).await?;
        self.head_memo.lock().await.insert(finalized, head.clone());
        Ok(head)
    }

    /// Fetches dataset metadata once per request; every later call reuses it.
    pub async fn metadata(&self) -> Result<Option<PortalMetadata>, GatewayError> {
        let v = self
            .metadata_memo
            .get_or_try_init(|| async { self.portal.metadata(&self.dataset_base_url, self.traceparent()).await })
            .await?;
        Ok(v.clone())
    }

    pub async fn start_block(&self) -> Result<Option<u64>, GatewayError> {
        Ok(self.metadata().await?.and_then(|m| m.start_block))
    }

    pub fn header_sink(&self) -> &dyn StreamHeaderSink {
        &self.head_sink
    }

    pub fn finalized_head_headers(&self) -> (Option<String>, Option<String>) {
        (
            self.head_sink.number.lock().expect("finalized head sink poisoned").clone(),
            self.head_sink.hash.lock().expect("finalized head sink poisoned").clone(),
        )
    }

    /// Fetches a block's uncles from upstream (`eth_getBlockByNumber(N, false)`),
    /// memoized per block number so a coalesced segment only asks once. Any
    /// failure (no upstream configured, transport error, malformed response)
    /// yields an empty list rather than failing the caller.
    pub async fn uncles_for(&self, upstream_url: Option<&str>, block_number: u64) -> Vec<Value> {
        if let Some(cached) = self.uncles_memo.lock().await.get(&block_number) {
            return cached.clone();
        }
        let result = match upstream_url {
            Some(url) => match self
                .upstream
                .forward(url, "eth_getBlockByNumber", json!([format!("0x{:x}", block_number), false]))
                .await
            {
                Ok(Value::Object(obj)) => {
                    obj.get("uncles").and_then(|v| v.as_array()).cloned().unwrap_or_default()
                }
                _ => Vec::new(),
            },
            None => Vec::new(),
        };
        self.uncles_memo.lock().await.insert(block_number, result.clone());
        result
    }
}

#[async_trait]
impl HeadSource for RequestCtx {
    async fn head(&self, _base_url: &str, finalized: bool) -> Result<HeadResult, GatewayError> {
        RequestCtx::head(self, finalized).await
    }
}

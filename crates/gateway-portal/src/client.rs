//! Portal client (C3): `head`, `finalized_head`, `metadata`, `stream_blocks`.
//! Grounded on the teacher's `SqdClient` (single reused `reqwest::Client`,
//! semaphore-bounded concurrency), generalized from a hardcoded
//! finalized-only two-field request to the full field-selection builder.
//!
//! Every operation below takes a `dataset_base_url`: the per-dataset Portal
//! base, already joined with [`PortalClient::dataset_url`]. Resolving chain
//! id to `(dataset, base_url)` and joining them is the caller's job (see
//! `gateway_core::chains::resolve_chain`), which keeps this client's surface
//! identical to the `HeadSource` trait validators depend on.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use gateway_core::config::Config;
use gateway_core::error::GatewayError;
use gateway_core::portal::{HeadResult, PortalBlock, PortalHead, PortalMetadata, RangeRequest};
use gateway_core::validate::HeadSource;
use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;

use crate::metrics::{FINALIZED_FALLBACK_TOTAL, PORTAL_LATENCY_SECONDS, PORTAL_REQUESTS_TOTAL};
use crate::ndjson::parse_ndjson;

/// Callback invoked with Portal's optional trailing stream headers
/// (`finalizedHeadNumber`, `finalizedHeadHash`). The first non-empty value
/// per key wins across a multi-request stream.
pub trait StreamHeaderSink: Send + Sync {
    fn finalized_head_number(&self, value: &str);
    fn finalized_head_hash(&self, value: &str);
}

/// HTTP client for the Portal API, reused across requests for connection
/// pooling and bounded by a semaphore to respect Portal's rate limit.
pub struct PortalClient {
    client: Client,
    semaphore: Arc<Semaphore>,
    api_key: Option<String>,
    api_key_header: String,
    negotiable_fields: Vec<String>,
}

impl PortalClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::builder()
                .timeout(config.http_timeout)
                .build()
                .expect("failed to build reqwest client"),
            semaphore: Arc::new(Semaphore::new(config.portal_max_concurrency)),
            api_key: config.portal_api_key.clone(),
            api_key_header: config.portal_api_key_header.clone(),
            negotiable_fields: config.portal_negotiable_fields.clone(),
        }
    }

    /// Strips a trailing `/` and any of the known endpoint suffixes from a
    /// configured base URL, so callers may pass either a bare base or a full
    /// endpoint URL interchangeably.
    pub fn normalize_base_url(base_url: &str) -> &str {
        let mut s = base_url.trim_end_matches('/');
        for suffix in ["/stream", "/finalized-stream", "/head", "/finalized-head", "/metadata"] {
            if let Some(stripped) = s.strip_suffix(suffix) {
                s = stripped;
            }
        }
        s
    }

    /// Joins a normalized base URL with `dataset`, substituting a
    /// `{dataset}` placeholder when present instead of appending.
    pub fn dataset_url(base_url: &str, dataset: &str) -> String {
        let base = Self::normalize_base_url(base_url);
        if base.contains("{dataset}") {
            base.replace("{dataset}", dataset)
        } else {
            format!("{base}/{dataset}")
        }
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(self.api_key_header.as_str(), key.as_str()),
            None => builder,
        }
    }

    fn apply_traceparent(builder: reqwest::RequestBuilder, traceparent: Option<&str>) -> reqwest::RequestBuilder {
        match traceparent {
            Some(v) => builder.header("traceparent", v),
            None => builder,
        }
    }

    /// Fetches the latest (or finalized) head. `dataset_base_url` must
    /// already be joined with the dataset. When `finalized=true` and Portal
    /// 404s, falls back once to the non-finalized head and reports
    /// `finalized_available=false`. `traceparent`, when supplied by the
    /// caller, is forwarded on every request this call makes.
    pub async fn head(
        &self,
        dataset_base_url: &str,
        finalized: bool,
        traceparent: Option<&str>,
    ) -> Result<HeadResult, GatewayError> {
        let endpoint = if finalized { "/finalized-head" } else { "/head" };
        match self.fetch_head(dataset_base_url, endpoint, traceparent).await {
            Ok(head) => Ok(HeadResult { number: head.number, hash: head.hash, finalized_available: finalized }),
            Err(GatewayError::NotFound(_)) if finalized => {
                FINALIZED_FALLBACK_TOTAL.inc();
                tracing::warn!(dataset_base_url, "finalized-head 404, falling back to head");
                let head = self.fetch_head(dataset_base_url, "/head", traceparent).await?;
                Ok(HeadResult { number: head.number, hash: head.hash, finalized_available: false })
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_head(
        &self,
        dataset_base_url: &str,
        endpoint: &str,
        traceparent: Option<&str>,
    ) -> Result<PortalHead, GatewayError> {
        let url = format!("{dataset_base_url}{endpoint}");
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");
        let start = Instant::now();
        let builder = Self::apply_traceparent(self.client.get(&url).header("Accept", "application/json"), traceparent);
        let resp = self.apply_auth(builder).send().await.map_err(map_transport_error)?;
        let status = resp.status();
        observe(endpoint, status, start);
        if status.is_success() {
            resp.json::<PortalHead>()
                .await
                .map_err(|e| GatewayError::ServerError(format!("invalid portal response: {e}")))
        } else {
            Err(map_status(status, &body_text(resp).await))
        }
    }

    /// Fetches dataset metadata. A 404 means "no metadata", not an error.
    pub async fn metadata(
        &self,
        dataset_base_url: &str,
        traceparent: Option<&str>,
    ) -> Result<Option<PortalMetadata>, GatewayError> {
        let url = format!("{dataset_base_url}/metadata");
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");
        let start = Instant::now();
        let builder = Self::apply_traceparent(self.client.get(&url).header("Accept", "application/json"), traceparent);
        let resp = self.apply_auth(builder).send().await.map_err(map_transport_error)?;
        let status = resp.status();
        observe("/metadata", status, start);
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_success() {
            resp.json::<PortalMetadata>()
                .await
                .map(Some)
                .map_err(|e| GatewayError::ServerError(format!("invalid portal response: {e}")))
        } else {
            Err(map_status(status, &body_text(resp).await))
        }
    }

    /// Streams blocks for `request`, handling unknown-field negotiation and
    /// continuity enforcement with one resume attempt.
    #[allow(clippy::too_many_arguments)]
    pub async fn stream_blocks(
        &self,
        dataset_base_url: &str,
        finalized: bool,
        request: RangeRequest,
        max_line_bytes: usize,
        max_bytes: usize,
        header_sink: Option<&dyn StreamHeaderSink>,
        traceparent: Option<&str>,
    ) -> Result<Vec<PortalBlock>, GatewayError> {
        let requires_continuity = request.requires_continuity();
        let to_block = request.to_block;
        let mut request = request;

        let mut blocks = self
            .stream_once(dataset_base_url, finalized, &mut request, max_line_bytes, max_bytes, header_sink, traceparent)
            .await?;

        if requires_continuity {
            if let Some(to) = to_block {
                let last = blocks.last().map(|b| b.header.number);
                if last != Some(to) {
                    let resume_from = last.map(|n| n + 1).unwrap_or(request.from_block);
                    if resume_from > to {
                        return Err(GatewayError::portal_stream_interrupted());
                    }
                    let mut resume_req = request.clone_for_resume(resume_from);
                    let resumed = self
                        .stream_once(
                            dataset_base_url,
                            finalized,
                            &mut resume_req,
                            max_line_bytes,
                            max_bytes,
                            header_sink,
                            traceparent,
                        )
                        .await?;
                    if resumed.first().map(|b| b.header.number) != Some(resume_from) {
                        return Err(GatewayError::portal_stream_interrupted());
                    }
                    blocks.extend(resumed);
                }
            }
        }

        Ok(blocks)
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_once(
        &self,
        dataset_base_url: &str,
        finalized: bool,
        request: &mut RangeRequest,
        max_line_bytes: usize,
        max_bytes: usize,
        header_sink: Option<&dyn StreamHeaderSink>,
        traceparent: Option<&str>,
    ) -> Result<Vec<PortalBlock>, GatewayError> {
        let endpoint = if finalized { "/finalized-stream" } else { "/stream" };
        let url = format!("{dataset_base_url}{endpoint}");

        loop {
            let _permit = self.semaphore.acquire().await.expect("semaphore closed");
            let start = Instant::now();
            let builder = Self::apply_traceparent(
                self.client
                    .post(&url)
                    .header("Accept", "application/x-ndjson")
                    .header("Content-Type", "application/json")
                    .json(request),
                traceparent,
            );
            let resp = self.apply_auth(builder).send().await.map_err(map_transport_error)?;
            let status = resp.status();
            observe(endpoint, status, start);

            if status == StatusCode::NO_CONTENT {
                return Ok(Vec::new());
            }

            if let Some(sink) = header_sink {
                if let Some(v) = resp.headers().get("finalizedHeadNumber").and_then(|v| v.to_str().ok()) {
                    if !v.is_empty() {
                        sink.finalized_head_number(v);
                    }
                }
                if let Some(v) = resp.headers().get("finalizedHeadHash").and_then(|v| v.to_str().ok()) {
                    if !v.is_empty() {
                        sink.finalized_head_hash(v);
                    }
                }
            }

            if status.is_success() {
                let text = resp.text().await.map_err(map_transport_error)?;
                return parse_ndjson::<PortalBlock>(&text, max_line_bytes, max_bytes);
            }

            if status == StatusCode::BAD_REQUEST {
                let body = body_text(resp).await;
                if let Some(field) = unknown_field(&body) {
                    if self.negotiable_fields.iter().any(|f| f == field) {
                        request.fields.strip_negotiable_field(field);
                        continue;
                    }
                }
                return Err(GatewayError::InvalidParams(format!("invalid portal response: {body}")));
            }

            return Err(map_status(status, &body_text(resp).await));
        }
    }
}

#[async_trait]
impl HeadSource for PortalClient {
    async fn head(&self, base_url: &str, finalized: bool) -> Result<HeadResult, GatewayError> {
        PortalClient::head(self, base_url, finalized, None).await
    }
}

fn observe(endpoint: &str, status: StatusCode, start: Instant) {
    PORTAL_REQUESTS_TOTAL.with_label_values(&[endpoint, status.as_str()]).inc();
    PORTAL_LATENCY_SECONDS.with_label_values(&[endpoint]).observe(start.elapsed().as_secs_f64());
}

async fn body_text(resp: reqwest::Response) -> String {
    resp.text().await.unwrap_or_default()
}

fn unknown_field(body: &str) -> Option<&str> {
    let marker = "unknown field `";
    let start = body.find(marker)? + marker.len();
    let rest = &body[start..];
    let end = rest.find('`')?;
    Some(&rest[..end])
}

fn map_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Unavailable("portal request timed out".to_string())
    } else {
        GatewayError::ServerError(format!("portal transport error: {e}"))
    }
}

/// Maps a Portal HTTP status to the local error taxonomy.
fn map_status(status: StatusCode, body: &str) -> GatewayError {
    match status {
        StatusCode::BAD_REQUEST => GatewayError::InvalidParams(format!("invalid portal response: {body}")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized,
        StatusCode::NOT_FOUND => GatewayError::block_not_found(),
        StatusCode::CONFLICT => GatewayError::Conflict { retryable: true, previous_blocks: None },
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimit("too many requests".to_string()),
        StatusCode::SERVICE_UNAVAILABLE => GatewayError::Unavailable("unavailable".to_string()),
        _ => GatewayError::ServerError("server error".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use gateway_core::config::{Config, RealtimeMode, ServiceMode};
    use gateway_core::portal::{FieldSelection, RangeRequest, TransactionFields};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config(portal_base_url: &str, negotiable_fields: Vec<String>) -> Config {
        Config {
            service_mode: ServiceMode::Single,
            listen_addr: "0.0.0.0:8080".to_string(),
            portal_base_url: portal_base_url.to_string(),
            portal_api_key: None,
            portal_api_key_header: "X-API-Key".to_string(),
            portal_dataset: Some("ds".to_string()),
            portal_dataset_map: HashMap::new(),
            portal_use_default_datasets: true,
            portal_chain_id: Some(1),
            portal_realtime_mode: RealtimeMode::Auto,
            portal_metadata_ttl: Duration::from_secs(30),
            portal_include_all_blocks: false,
            portal_negotiable_fields: negotiable_fields,
            portal_max_concurrency: 20,
            max_log_block_range: 10,
            max_log_addresses: 2,
            max_block_number: 9_007_199_254_740_991,
            http_timeout: Duration::from_secs(5),
            handler_timeout: Duration::from_secs(5),
            max_concurrent_requests: 256,
            max_ndjson_line_bytes: 4096,
            max_ndjson_bytes: 1024 * 1024,
            max_request_body_bytes: 1024 * 1024,
            wrapper_api_key: None,
            wrapper_api_key_header: "X-API-Key".to_string(),
            upstream_rpc_url: None,
            upstream_rpc_url_map: HashMap::new(),
            upstream_methods_enabled: false,
        }
    }

    #[tokio::test]
    async fn finalized_head_404_falls_back_to_head() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ds/finalized-head"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ds/head"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "number": 100,
                "hash": "0xhead",
            })))
            .mount(&server)
            .await;

        let client = PortalClient::new(&test_config(&server.uri(), vec![]));
        let dataset_base_url = format!("{}/ds", server.uri());
        let result = client.head(&dataset_base_url, true, None).await.unwrap();

        assert_eq!(result.number, 100);
        assert!(!result.finalized_available);
    }

    #[tokio::test]
    async fn metadata_404_is_none_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ds/metadata"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = PortalClient::new(&test_config(&server.uri(), vec![]));
        let dataset_base_url = format!("{}/ds", server.uri());
        let result = client.metadata(&dataset_base_url, None).await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn stream_strips_unknown_negotiable_field_and_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ds/stream"))
            .and(body_string_contains("authorizationList"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error":"unknown field `authorizationList` at fields.transaction"}"#,
            ))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ds/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{\"header\":{\"number\":1,\"hash\":\"0xblk1\"}}\n")
                    .insert_header("content-type", "application/x-ndjson"),
            )
            .with_priority(2)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), vec!["authorizationList".to_string()]);
        let client = PortalClient::new(&config);
        let dataset_base_url = format!("{}/ds", server.uri());

        let fields = FieldSelection { transaction: Some(TransactionFields::all()), ..Default::default() };
        let request = RangeRequest::new(1, Some(1), fields);

        let blocks = client
            .stream_blocks(&dataset_base_url, false, request, 4096, 1024 * 1024, None, None)
            .await
            .unwrap();

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].header.number, 1);
    }

    #[tokio::test]
    async fn stream_resumes_once_across_a_continuity_gap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ds/stream"))
            .and(body_string_contains(r#""fromBlock":1"#))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "{\"header\":{\"number\":1,\"hash\":\"0xblk1\"}}\n{\"header\":{\"number\":2,\"hash\":\"0xblk2\"}}\n",
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ds/stream"))
            .and(body_string_contains(r#""fromBlock":3"#))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{\"header\":{\"number\":3,\"hash\":\"0xblk3\"}}\n"),
            )
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), vec![]);
        let client = PortalClient::new(&config);
        let dataset_base_url = format!("{}/ds", server.uri());

        let fields = FieldSelection { transaction: Some(TransactionFields::hash_only()), ..Default::default() };
        let mut request = RangeRequest::new(1, Some(3), fields);
        request.transactions = Some(vec![Default::default()]);

        let blocks = client
            .stream_blocks(&dataset_base_url, false, request, 4096, 1024 * 1024, None, None)
            .await
            .unwrap();

        let numbers: Vec<u64> = blocks.iter().map(|b| b.header.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn normalizes_base_url_suffixes() {
        assert_eq!(PortalClient::normalize_base_url("https://portal.sqd.dev/"), "https://portal.sqd.dev");
        assert_eq!(
            PortalClient::normalize_base_url("https://portal.sqd.dev/finalized-stream"),
            "https://portal.sqd.dev"
        );
    }

    #[test]
    fn builds_per_dataset_url() {
        let url = PortalClient::dataset_url("https://portal.sqd.dev", "ethereum-mainnet");
        assert_eq!(url, "https://portal.sqd.dev/ethereum-mainnet");
    }

    #[test]
    fn substitutes_dataset_placeholder() {
        let url = PortalClient::dataset_url("https://portal.sqd.dev/{dataset}", "ethereum-mainnet");
        assert_eq!(url, "https://portal.sqd.dev/ethereum-mainnet");
    }

    #[test]
    fn extracts_unknown_field_name() {
        let body = r#"{"error":"unknown field `authorizationList` at fields.transaction"}"#;
        assert_eq!(unknown_field(body), Some("authorizationList"));
    }

    #[test]
    fn maps_statuses_to_taxonomy() {
        assert!(matches!(map_status(StatusCode::UNAUTHORIZED, ""), GatewayError::Unauthorized));
        assert!(matches!(map_status(StatusCode::NOT_FOUND, ""), GatewayError::NotFound(_)));
        assert!(matches!(map_status(StatusCode::CONFLICT, ""), GatewayError::Conflict { .. }));
        assert!(matches!(map_status(StatusCode::TOO_MANY_REQUESTS, ""), GatewayError::RateLimit(_)));
    }
}

//! Shared application state: configuration plus the Portal/upstream clients
//! and the concurrency admission semaphore. There is no cross-request cache
//! here; per-request memoization lives in [`crate::ctx::RequestCtx`] and is
//! discarded at the end of each HTTP call, keeping the gateway stateless.

use std::sync::Arc;

use gateway_core::config::Config;
use gateway_portal::PortalClient;
use gateway_upstream::UpstreamClient;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub portal: Arc<PortalClient>,
    pub upstream: Arc<UpstreamClient>,
    pub admission: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let portal = PortalClient::new(&config);
        let upstream = UpstreamClient::new(config.http_timeout);
        let admission = Semaphore::new(config.max_concurrent_requests);
        Self {
            config: Arc::new(config),
            portal: Arc::new(portal),
            upstream: Arc::new(upstream),
            admission: Arc::new(admission),
        }
    }
}

pub mod client;
pub mod metrics;
pub mod ndjson;

pub use client::{PortalClient, StreamHeaderSink};

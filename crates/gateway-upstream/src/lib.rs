pub mod client;

pub use client::{ForwardedError, UpstreamClient};

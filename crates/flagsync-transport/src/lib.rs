//! # flagsync-transport
//!
//! The HTTP surface shared by the State Refresher (conditional CDN fetch)
//! and the Telemetry Flusher (log-sink POST): retry with backoff, timeouts,
//! and connection pooling.

mod client;
mod config;
mod error;
mod retry;

pub use client::{ConditionalGetOutcome, TransportClient};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, ErrorKind, Result};
pub use retry::{BackoffStrategy, RetryConfig, RetryPolicy};

pub const USER_AGENT: &str = concat!("flagsync/", env!("CARGO_PKG_VERSION"));

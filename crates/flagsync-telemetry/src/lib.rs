//! Loss-tolerant, periodic flushing of evaluation telemetry to a remote
//! log sink.
//!
//! The [`TelemetryFlusher`] drains the [`flagsync_bridge::Supervisor`]'s
//! salvage buffer on an interval and ships it as a single POST body. A
//! failed flush is dropped, not re-buffered: the contract guaranteed here
//! is that the salvage buffer survives guest crashes, not that delivery
//! survives network failures.

mod config;
mod error;
mod flusher;

pub use config::{TelemetryFlusherConfig, TelemetryFlusherConfigBuilder};
pub use error::{FlushError, Result};
pub use flusher::{TelemetryFlusher, LOG_CONTENT_TYPE};

//! Typed flag-resolution façade over the sandboxed resolver host.
//!
//! [`Provider`] ties together the guest [`flagsync_bridge::Supervisor`],
//! the [`flagsync_state::StateRefresher`], and the
//! [`flagsync_telemetry::TelemetryFlusher`] into one connect/shutdown
//! lifecycle, and exposes typed accessors (`resolve_bool`, `resolve_string`,
//! `resolve_int`, `resolve_float`, `resolve_object`) over the guest's
//! dynamically typed resolved values.

mod config;
mod error;
mod provider;
mod resolution;

pub use config::{ProviderConfig, ProviderConfigBuilder};
pub use error::{FacadeError, Result};
pub use flagsync_abi::{EvaluationContext, ResolveReason, Value};
pub use provider::Provider;
pub use resolution::ResolutionDetails;

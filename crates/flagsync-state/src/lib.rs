//! Periodic, ETag-conditional state refresh for the resolver host.
//!
//! The [`StateRefresher`] owns the CDN fetch cycle and keeps the
//! [`flagsync_bridge::Supervisor`] holding the freshest rule state it has
//! been able to obtain, falling back to the last-known-good payload across
//! transient failures and `304` responses.

mod config;
mod error;
mod refresher;

pub use config::{StateRefresherConfig, StateRefresherConfigBuilder};
pub use error::{RefreshError, Result};
pub use refresher::StateRefresher;

//! # flagsync
//!
//! A local, WASM-sandboxed feature-flag resolution host.
//!
//! Flags are resolved synchronously, in-process, by a guest WebAssembly
//! module fed periodically refreshed rule state from a remote CDN.
//! Evaluation telemetry is buffered and flushed asynchronously. A guest
//! trap during resolution is caught, the instance is transparently
//! reloaded from the last-known-good state, and the original error is
//! still surfaced to the caller — a crashed guest never silently
//! swallows a resolution.
//!
//! ## Crates
//!
//! - **flagsync-abi** - Wire types and the length-prefixed envelope shared
//!   across the host/guest boundary
//! - **flagsync-bridge** - The guest bridge and fault-isolating supervisor
//! - **flagsync-transport** - Retrying HTTP client for the CDN and log sink
//! - **flagsync-state** - Periodic, ETag-conditional state refresh
//! - **flagsync-telemetry** - Periodic, loss-tolerant log flushing
//! - **flagsync-provider** - Typed flag-value accessors tying it together
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use flagsync::{EvaluationContext, Provider, ProviderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProviderConfig::builder("./resolver.wasm", "client-secret").build();
//!     let provider = Provider::connect(config).await?;
//!
//!     let details = provider.resolve_bool("my-flag", false, None).await?;
//!     println!("my-flag = {}", details.value);
//!
//!     provider.shutdown().await;
//!     Ok(())
//! }
//! ```

#[cfg(feature = "provider")]
pub use flagsync_provider::{
    EvaluationContext, FacadeError, Provider, ProviderConfig, ProviderConfigBuilder,
    ResolutionDetails, ResolveReason, Value,
};

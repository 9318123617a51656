//! # flagsync-bridge
//!
//! The sandboxed resolver host's inner two layers: the **Guest Bridge**,
//! sole custodian of a live guest instance and the only code allowed to
//! touch its linear memory, and the **Supervisor**, which wraps the Bridge
//! and converts guest traps into transparent instance reloads.
//!
//! ## ABI contract
//!
//! The guest exports `alloc(n) -> offset`, `free(offset)`, and one entry
//! point per operation (`set_resolver_state`, `resolve_with_sticky`,
//! `flush_logs`); it imports `current_time` and, optionally, `log_resolve`,
//! `log_assign`, and `current_thread_id`. Every transferred message at
//! offset `p` has its total block length at `p - 4`. See
//! [`flagsync_abi`] for the wire-level encoding and [`memory`] for the
//! bounds-checked accessors built on it.
//!
//! ## Fault isolation
//!
//! A guest trap invalidates the whole instance; the [`Supervisor`] discards
//! it, builds a fresh one from the cached module, and re-applies the last
//! known state before re-raising the original error. A guest-reported
//! `Response::Error` is different: the instance stays healthy and the error
//! passes straight through.

mod bridge;
mod error;
mod host_functions;
mod memory;
mod supervisor;

pub use bridge::{validate_module, GuestBridge};
pub use error::{BridgeError, Result};
pub use supervisor::Supervisor;

use wasmtime::{Config, Engine};

/// Build the wasmtime engine used to compile and run guest modules.
///
/// Unlike a deterministic-execution sandbox, this host has no requirement
/// that two runs of the same guest produce bit-identical output across
/// engine versions, so the engine uses wasmtime's defaults rather than
/// pinning the NaN-canonicalization / SIMD-disabling knobs a consensus
/// runtime would need.
pub fn create_engine() -> wasmtime::Result<Engine> {
    Engine::new(&Config::new())
}

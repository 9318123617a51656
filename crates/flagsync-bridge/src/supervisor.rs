//! The Supervisor: converts transient guest faults into recoverable
//! operations without surfacing a broken instance to callers.

use std::sync::Arc;

use tokio::sync::Mutex;
use wasmtime::{Engine, Module};

use crate::bridge::{validate_module, GuestBridge};
use crate::error::{BridgeError, Result};

struct SupervisorState {
    bridge: GuestBridge,
    /// The most recent state payload successfully applied. The authority
    /// used to restore a freshly reloaded instance.
    current_state: Option<Vec<u8>>,
    /// Ordered log chunks salvaged from condemned instances or returned by
    /// successful flushes, drained only once a flush to the remote sink
    /// succeeds (from the caller's point of view — the Supervisor itself
    /// drains it on every `flush_logs` call, per the flush path contract).
    salvage_buffer: Vec<Vec<u8>>,
}

/// Serializes all calls into a single guest instance and reloads it
/// transparently on trap.
///
/// All three operations are mutually exclusive and run to completion
/// atomically with respect to each other: the lock is held across the full
/// guest call, which is synchronous and must not suspend.
pub struct Supervisor {
    engine: Engine,
    module: Arc<Module>,
    state: Mutex<SupervisorState>,
}

impl Supervisor {
    /// Compile-and-validate the guest module once; build the first instance.
    /// A trap during this initial construction is an unrecoverable bootstrap
    /// failure and is returned directly — there is no prior state to fall
    /// back on.
    pub fn new(engine: Engine, module: Module) -> Result<Self> {
        validate_module(&module)?;
        let module = Arc::new(module);
        let bridge = GuestBridge::new(&engine, &module)?;
        Ok(Self {
            engine,
            module,
            state: Mutex::new(SupervisorState {
                bridge,
                current_state: None,
                salvage_buffer: Vec::new(),
            }),
        })
    }

    /// `set_state(bytes)`: pending-current becomes current only on success.
    /// On trap, reload restores the *previous* current state — the pending
    /// bytes are discarded, since they may be what crashed the guest.
    #[tracing::instrument(skip_all)]
    pub async fn set_state(&self, state: Vec<u8>) -> Result<()> {
        let mut guard = self.state.lock().await;
        match guard.bridge.set_state(&state) {
            Ok(()) => {
                guard.current_state = Some(state);
                Ok(())
            }
            Err(e) if e.is_trap() => Err(self.reload(&mut guard, e)),
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn resolve(&self, request: &[u8]) -> Result<Vec<u8>> {
        let mut guard = self.state.lock().await;
        match guard.bridge.resolve(request) {
            Ok(response) => Ok(response),
            Err(e) if e.is_trap() => Err(self.reload(&mut guard, e)),
            Err(e) => Err(e),
        }
    }

    /// `flush_logs()`: appends the guest's chunk to the salvage buffer (if
    /// any), then drains and returns the whole buffer concatenated in
    /// order. On trap, reload proceeds and the salvage buffer survives it —
    /// chunks from the dead instance are not lost.
    #[tracing::instrument(skip_all)]
    pub async fn flush_logs(&self) -> Result<Vec<u8>> {
        let mut guard = self.state.lock().await;
        match guard.bridge.flush_logs() {
            Ok(chunk) => {
                if !chunk.is_empty() {
                    guard.salvage_buffer.push(chunk);
                }
                Ok(drain_salvage(&mut guard.salvage_buffer))
            }
            Err(e) if e.is_trap() => Err(self.reload(&mut guard, e)),
            Err(e) => Err(e),
        }
    }

    /// Runs the reload protocol and returns the error to re-raise to the
    /// caller: the original fault, or a `ReloadFailed` wrapping it if the
    /// reload itself could not complete. Attempted at most once per call.
    fn reload(&self, guard: &mut SupervisorState, original: BridgeError) -> BridgeError {
        tracing::error!(error = %original, "guest trap, reloading instance");

        if let Ok(chunk) = guard.bridge.flush_logs() {
            if !chunk.is_empty() {
                guard.salvage_buffer.push(chunk);
            }
        }

        let fresh = match GuestBridge::new(&self.engine, &self.module) {
            Ok(b) => b,
            Err(reload_error) => {
                return BridgeError::ReloadFailed {
                    original: Box::new(original),
                    reload_error: Box::new(reload_error),
                };
            }
        };
        guard.bridge = fresh;

        if let Some(current) = guard.current_state.clone() {
            if let Err(reload_error) = guard.bridge.set_state(&current) {
                return BridgeError::ReloadFailed {
                    original: Box::new(original),
                    reload_error: Box::new(reload_error),
                };
            }
        }

        original
    }
}

fn drain_salvage(buffer: &mut Vec<Vec<u8>>) -> Vec<u8> {
    let combined = buffer.concat();
    buffer.clear();
    combined
}

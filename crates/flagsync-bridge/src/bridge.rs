//! The Guest Bridge: sole custodian of a live guest instance and the only
//! code allowed to read or write its linear memory.

use flagsync_abi::{decode_response, encode_request, guest_exports, Request};
use wasmtime::{Engine, Instance, Linker, Memory, Module, Store};

use crate::error::{BridgeError, Result};
use crate::host_functions::{register_host_functions, HostState};
use crate::memory;

/// Checks that a module exports everything the ABI contract requires before
/// a `GuestBridge` is built around it.
pub fn validate_module(module: &Module) -> Result<()> {
    for name in [
        guest_exports::ALLOC,
        guest_exports::FREE,
        guest_exports::SET_RESOLVER_STATE,
        guest_exports::RESOLVE_WITH_STICKY,
        guest_exports::FLUSH_LOGS,
        guest_exports::MEMORY,
    ] {
        if module.get_export(name).is_none() {
            return Err(BridgeError::MissingExport(name.to_string()));
        }
    }
    Ok(())
}

/// One live guest execution context: linear memory plus the exported entry
/// points. Owned exclusively by whoever holds it; discarded wholesale on
/// trap, never mutated in place.
pub struct GuestBridge {
    store: Store<HostState>,
    instance: Instance,
    memory: Memory,
}

impl GuestBridge {
    /// Instantiate a fresh guest from an already-compiled, validated module.
    #[tracing::instrument(skip_all)]
    pub fn new(engine: &Engine, module: &Module) -> Result<Self> {
        let mut store = Store::new(engine, HostState);
        let mut linker = Linker::new(engine);
        register_host_functions(&mut linker, module)?;
        let instance = linker.instantiate(&mut store, module)?;
        let memory = instance
            .get_memory(&mut store, guest_exports::MEMORY)
            .ok_or(BridgeError::MissingMemory)?;
        Ok(Self {
            store,
            instance,
            memory,
        })
    }

    fn typed_i32_to_i32(&mut self, name: &str) -> Result<wasmtime::TypedFunc<i32, i32>> {
        self.instance
            .get_typed_func::<i32, i32>(&mut self.store, name)
            .map_err(|_| BridgeError::MissingExport(name.to_string()))
    }

    fn alloc(&mut self, len: usize) -> Result<i32> {
        let f = self.typed_i32_to_i32(guest_exports::ALLOC)?;
        handle_trap(f.call(&mut self.store, len as i32))
    }

    fn free(&mut self, offset: i32) -> Result<()> {
        let f = self
            .instance
            .get_typed_func::<i32, ()>(&mut self.store, guest_exports::FREE)
            .map_err(|_| BridgeError::MissingExport(guest_exports::FREE.to_string()))?;
        handle_trap(f.call(&mut self.store, offset))
    }

    /// Allocate a block sized for `payload`, write it, call `entry_point`
    /// with the resulting offset, and return the bytes of whatever the
    /// guest's response offset points to — freeing that response block
    /// before returning. The request block itself is not freed here: the
    /// guest consumes (and is responsible for reclaiming) its own input.
    fn call_entry(&mut self, entry_point: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let req_offset = self.alloc(payload.len())?;
        memory::write_bytes(self.memory.data_mut(&mut self.store), req_offset, payload)?;

        let entry = self.typed_i32_to_i32(entry_point)?;
        let resp_offset = handle_trap(entry.call(&mut self.store, req_offset))?;

        let resp_bytes = memory::read_framed(self.memory.data(&self.store), resp_offset)?;
        self.free(resp_offset)?;
        Ok(resp_bytes)
    }

    fn call_with_response(&mut self, entry_point: &str, data: Vec<u8>) -> Result<Vec<u8>> {
        let envelope = encode_request(&Request { data });
        let resp_bytes = self.call_entry(entry_point, &envelope)?;
        let response = decode_response(&resp_bytes)?;
        response.into_result().map_err(BridgeError::GuestError)
    }

    /// `set_state(bytes)`: apply a new opaque state payload.
    #[tracing::instrument(skip_all)]
    pub fn set_state(&mut self, state: &[u8]) -> Result<()> {
        self.call_with_response(guest_exports::SET_RESOLVER_STATE, state.to_vec())
            .map(|_| ())
    }

    /// `resolve(request)`: evaluate flags, returning the guest's structured
    /// response bytes unchanged.
    #[tracing::instrument(skip_all)]
    pub fn resolve(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        self.call_with_response(guest_exports::RESOLVE_WITH_STICKY, request.to_vec())
    }

    /// `flush_logs()`: drain the guest's buffered telemetry.
    #[tracing::instrument(skip_all)]
    pub fn flush_logs(&mut self) -> Result<Vec<u8>> {
        self.call_with_response(guest_exports::FLUSH_LOGS, Vec::new())
    }
}

/// Distinguish a wasmtime trap from a clean call. Envelope decode errors are
/// folded into the trap class by the caller, not here — this only covers
/// the wasmtime-level fault.
fn handle_trap<R>(result: wasmtime::Result<R>) -> Result<R> {
    result.map_err(|e| BridgeError::Trap(e.to_string()))
}

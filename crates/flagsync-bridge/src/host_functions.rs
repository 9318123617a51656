//! Host functions importable by the guest: `current_time`, and the optional
//! telemetry hooks `log_resolve`/`log_assign`/`current_thread_id`.
//!
//! Each framed function (`current_time`, `log_resolve`, `log_assign`) follows
//! the same shape as a guest-exported entry point, but in reverse: the guest
//! calls in with an offset, the host reads/writes the guest's own linear
//! memory, and — if it needs to hand bytes back — calls back into the
//! guest's `alloc` export to get a destination offset. Errors here are
//! reported to the guest as `Response::Error` rather than by trapping the
//! host, per the ABI contract.

use std::time::{SystemTime, UNIX_EPOCH};

use flagsync_abi::{encode_response, guest_exports, guest_imports, Response};
use wasmtime::{Caller, Linker, Memory};

use crate::memory as mem;

/// Store-associated state. Host functions need no shared mutable state of
/// their own — `current_time` must be computed fresh on every call.
#[derive(Default)]
pub struct HostState;

/// Register `current_time` unconditionally, and `log_resolve`/`log_assign`/
/// `current_thread_id` only if the guest declares them as imports — guest
/// modules built against either surface of the ABI link successfully.
pub fn register_host_functions(
    linker: &mut Linker<HostState>,
    module: &wasmtime::Module,
) -> wasmtime::Result<()> {
    linker.func_wrap(guest_imports::MODULE, guest_imports::CURRENT_TIME, current_time)?;

    let wants_import = |name: &str| {
        module
            .imports()
            .any(|i| i.module() == guest_imports::MODULE && i.name() == name)
    };

    if wants_import(guest_imports::LOG_RESOLVE) {
        linker.func_wrap(guest_imports::MODULE, guest_imports::LOG_RESOLVE, noop_ack)?;
    }
    if wants_import(guest_imports::LOG_ASSIGN) {
        linker.func_wrap(guest_imports::MODULE, guest_imports::LOG_ASSIGN, noop_ack)?;
    }
    if wants_import(guest_imports::CURRENT_THREAD_ID) {
        linker.func_wrap(
            guest_imports::MODULE,
            guest_imports::CURRENT_THREAD_ID,
            |_: Caller<'_, HostState>| -> i32 { 0 },
        )?;
    }
    Ok(())
}

fn get_memory(caller: &mut Caller<'_, HostState>) -> Option<Memory> {
    caller
        .get_export(guest_exports::MEMORY)
        .and_then(|e| e.into_memory())
}

/// Call back into the guest's `alloc` export to reserve `len` payload bytes,
/// then write `payload` there. Returns the offset handed back by `alloc`.
fn transfer_to_guest(
    caller: &mut Caller<'_, HostState>,
    memory: &Memory,
    payload: &[u8],
) -> wasmtime::Result<i32> {
    let alloc = caller
        .get_export(guest_exports::ALLOC)
        .and_then(|e| e.into_func())
        .ok_or_else(|| wasmtime::Error::msg("guest is missing the alloc export"))?
        .typed::<i32, i32>(&*caller)?;
    let offset = alloc.call(&mut *caller, payload.len() as i32)?;
    mem::write_bytes(memory.data_mut(&mut *caller), offset, payload)
        .map_err(|e| wasmtime::Error::msg(e.to_string()))?;
    Ok(offset)
}

fn respond(caller: &mut Caller<'_, HostState>, memory: &Memory, response: Response) -> i32 {
    let encoded = encode_response(&response);
    match transfer_to_guest(caller, memory, &encoded) {
        Ok(offset) => offset,
        // The host function itself must not trap; a failure to transfer the
        // response back leaves the guest with no offset to consume, which
        // the guest's own ABI contract must treat as an error return of 0.
        Err(_) => 0,
    }
}

/// `current_time(offset) -> offset`. The input offset carries no payload
/// this host interprets; a fresh timestamp is produced on every call.
fn current_time(mut caller: Caller<'_, HostState>, _input: i32) -> i32 {
    let memory = match get_memory(&mut caller) {
        Some(m) => m,
        None => return 0,
    };
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    respond(&mut caller, &memory, Response::ok(millis.to_le_bytes().to_vec()))
}

/// `log_resolve`/`log_assign`: accept an opaque record, acknowledge with an
/// empty `Response::Data`. The input block is read (and its bytes ignored —
/// the host does not interpret telemetry payloads) but never freed here:
/// it was allocated by the guest for the duration of this single call and
/// is the guest's own responsibility to reclaim.
fn noop_ack(mut caller: Caller<'_, HostState>, input: i32) -> i32 {
    let memory = match get_memory(&mut caller) {
        Some(m) => m,
        None => return 0,
    };
    if input != 0 {
        let _ = mem::read_framed(memory.data(&caller), input);
    }
    respond(&mut caller, &memory, Response::ok(Vec::new()))
}

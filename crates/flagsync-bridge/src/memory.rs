//! Bounds-checked guest linear memory access and the length-prefixed
//! block convention described in the ABI contract.
//!
//! A transferred message at offset `p` has its total block length (4
//! little-endian bytes, including the prefix itself) stored at `p - 4`; the
//! payload occupies `[p, p + L - 4)`.

use crate::error::{BridgeError, Result};

/// Read `len` bytes from guest memory at `ptr`.
pub fn read_bytes(mem: &[u8], ptr: i32, len: i32) -> Result<Vec<u8>> {
    if ptr < 0 || len < 0 {
        return Err(BridgeError::BadPointer { offset: ptr, len });
    }
    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or(BridgeError::BadPointer { offset: ptr, len })?;
    if end > mem.len() {
        return Err(BridgeError::BadPointer { offset: ptr, len });
    }
    Ok(mem[start..end].to_vec())
}

/// Write `data` into guest memory at `ptr`.
pub fn write_bytes(mem: &mut [u8], ptr: i32, data: &[u8]) -> Result<()> {
    if ptr < 0 {
        return Err(BridgeError::BadPointer {
            offset: ptr,
            len: data.len() as i32,
        });
    }
    let start = ptr as usize;
    let end = start.checked_add(data.len()).ok_or(BridgeError::BadPointer {
        offset: ptr,
        len: data.len() as i32,
    })?;
    if end > mem.len() {
        return Err(BridgeError::BadPointer {
            offset: ptr,
            len: data.len() as i32,
        });
    }
    mem[start..end].copy_from_slice(data);
    Ok(())
}

/// Read a little-endian `i32` from guest memory at `ptr`.
pub fn read_i32(mem: &[u8], ptr: i32) -> Result<i32> {
    let bytes = read_bytes(mem, ptr, 4)?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read the length-prefixed block starting at `offset`: the four bytes at
/// `offset - 4` give the total block length `L` (including the prefix); the
/// payload is `[offset, offset + L - 4)`.
pub fn read_framed(mem: &[u8], offset: i32) -> Result<Vec<u8>> {
    if offset < 4 {
        return Err(BridgeError::BadPointer { offset, len: 0 });
    }
    let total_len = read_i32(mem, offset - 4)?;
    let payload_len = total_len - 4;
    if payload_len < 0 {
        return Err(BridgeError::BadPointer {
            offset,
            len: payload_len,
        });
    }
    read_bytes(mem, offset, payload_len)
}

/// Write `data` at `offset` with its length prefix at `offset - 4`, as
/// required by a guest block already sized for `data.len() + 4` bytes by
/// whoever called `alloc`.
pub fn write_framed(mem: &mut [u8], offset: i32, data: &[u8]) -> Result<()> {
    let total_len = data.len() as i32 + 4;
    write_bytes(mem, offset - 4, &total_len.to_le_bytes())?;
    write_bytes(mem, offset, data)
}

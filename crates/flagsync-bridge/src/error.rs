use flagsync_abi::EnvelopeDecodeError;

/// Errors raised by the guest bridge and supervisor.
///
/// Classes 1-4 of the error taxonomy live here: guest trap, guest-reported
/// error, envelope/format error (folded into the trap class — the instance
/// is presumed corrupt), and the missing-dependency response.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("guest trap: {0}")]
    Trap(String),

    #[error("guest reported error: {0}")]
    GuestError(String),

    #[error("malformed response envelope: {0}")]
    Envelope(#[from] EnvelopeDecodeError),

    #[error("out-of-bounds guest memory access at offset {offset} (len {len})")]
    BadPointer { offset: i32, len: i32 },

    #[error("guest module is missing required export: {0}")]
    MissingExport(String),

    #[error("guest module is missing memory export")]
    MissingMemory,

    #[error("wasm engine error: {0}")]
    Wasm(#[from] wasmtime::Error),

    #[error("reload failed after {original}: {reload_error}")]
    ReloadFailed {
        original: Box<BridgeError>,
        reload_error: Box<BridgeError>,
    },
}

impl BridgeError {
    /// Classes 1 and 3 trigger the Supervisor's reload protocol; everything
    /// else (a healthy guest reporting an application-level error) passes
    /// through unchanged.
    pub fn is_trap(&self) -> bool {
        !matches!(self, BridgeError::GuestError(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors from a single flush attempt. Always logged, never propagated —
/// a failed flush is best-effort and the bytes are not re-buffered.
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error(transparent)]
    Transport(#[from] flagsync_transport::Error),

    #[error(transparent)]
    Bridge(#[from] flagsync_bridge::BridgeError),
}

pub type Result<T> = std::result::Result<T, FlushError>;

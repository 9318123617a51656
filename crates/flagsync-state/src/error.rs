/// Errors from a single refresh cycle. Startup propagates these; the
/// periodic loop logs and continues.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Transport(#[from] flagsync_transport::Error),

    #[error(transparent)]
    Bridge(#[from] flagsync_bridge::BridgeError),

    #[error("304 response with no prior cached payload to fall back to")]
    NotModifiedWithoutCache,

    #[error("initial state fetch timed out")]
    StartupTimeout,
}

pub type Result<T> = std::result::Result<T, RefreshError>;

/// Errors surfaced at the façade boundary (error classes 4, 6, 7; see the
/// taxonomy in the crate's design notes). Classes 1-3 and 5 are carried
/// through from the bridge and transport crates unchanged.
#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    #[error(transparent)]
    Bridge(#[from] flagsync_bridge::BridgeError),

    #[error(transparent)]
    Refresh(#[from] flagsync_state::RefreshError),

    #[error("failed to decode guest response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("flag `{flag_key}` requested as {expected} but resolved to a {actual} value")]
    TypeMismatch {
        flag_key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("flag `{flag_key}` has no value at path `{path}`")]
    PathNotFound { flag_key: String, path: String },

    #[error("flag `{flag_key}` not found in resolver response")]
    FlagNotFound { flag_key: String },

    #[error("flag `{flag_key}` requires sticky/materialization state not available locally")]
    RequiresRemoteFallback { flag_key: String },

    #[error("startup initial state fetch failed: {0}")]
    StartupFailed(String),
}

pub type Result<T> = std::result::Result<T, FacadeError>;

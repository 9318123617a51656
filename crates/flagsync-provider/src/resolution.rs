use flagsync_abi::ResolveReason;

/// The outcome of a typed flag resolution: the converted value plus the
/// guest's reasoning about how it arrived at it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionDetails<T> {
    pub value: T,
    pub reason: ResolveReason,
    pub variant: String,
}

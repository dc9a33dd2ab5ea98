//! Registry error types

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Viewer asked for a channel with no prior activity
    #[error("stream not found: {0}")]
    StreamNotFound(String),
}

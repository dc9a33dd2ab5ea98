//! Error types for the relay

use std::path::PathBuf;

use crate::registry::RegistryError;

/// Exit status used when the certificate or private key cannot be loaded
pub const MISSING_CREDENTIAL_EXIT_CODE: i32 = 2;

/// Result type alias using the relay's [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session open request used the wrong method or protocol
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Session open request targeted an unknown path
    #[error("route not found: {0}")]
    RouteNotFound(String),

    /// Registry operation failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Sending a datagram to a viewer failed
    #[error("delivery to session {session_id} failed: {source}")]
    DeliveryFailure {
        session_id: u64,
        #[source]
        source: std::io::Error,
    },

    /// Certificate or key could not be read at startup
    #[error("missing credential {}: {reason}", .path.display())]
    MissingCredential { path: PathBuf, reason: String },

    /// Server is already at its configured connection limit
    #[error("connection limit reached ({0})")]
    ConnectionLimit(usize),

    /// Transport-level I/O error
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl Error {
    /// Process exit status to use when this error aborts startup
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MissingCredential { .. } => MISSING_CREDENTIAL_EXIT_CODE,
            _ => 1,
        }
    }

    /// Whether this error must stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::MissingCredential { .. })
    }
}

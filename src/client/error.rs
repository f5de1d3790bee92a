//! Error types for the client facade.

use thiserror::Error;

use crate::nostr::NostrError;
use crate::relay::RelayError;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Key, event or encryption error.
    #[error(transparent)]
    Nostr(#[from] NostrError),

    /// Relay setup error.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Operation not allowed in the current state.
    #[error("Invalid client state: expected {expected}, found {actual}")]
    InvalidState {
        /// State the operation needs.
        expected: &'static str,
        /// State the client is in.
        actual: &'static str,
    },

    /// Configuration could not be read or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

//! Error types for relay operations.
//!
//! Only local problems reach callers: fan-out failures on individual relays
//! are logged and recorded in the relay's state instead.

use thiserror::Error;

use crate::nostr::NostrError;

/// Errors that can occur during relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Connection to relay failed.
    #[error("Failed to connect to relay {url}: {reason}")]
    Connection {
        /// The relay URL that failed.
        url: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Writing to an open relay failed.
    #[error("Failed to send to relay {url}: {reason}")]
    Send {
        /// The relay URL.
        url: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Invalid relay URL.
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),

    /// Relay is not open.
    #[error("Relay not connected: {0}")]
    NotConnected(String),

    /// Timeout waiting for operation.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// TLS connector could not be built.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// A message could not be serialized.
    #[error(transparent)]
    Nostr(#[from] NostrError),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

//! Error types for Nostr operations.

use thiserror::Error;

/// Errors that can occur during key handling, event construction and
/// message encryption.
#[derive(Error, Debug)]
pub enum NostrError {
    /// Secret key material (seed, hex, nsec) could not be turned into a keypair.
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// A public key could not be parsed.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Encryption operation failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// The payload is not decryptable with this shared secret.
    ///
    /// Expected for direct messages that were not meant for us; callers
    /// skip these without raising an alarm.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Event signing failed.
    #[error("Event signing failed: {0}")]
    Signing(String),

    /// Serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid event structure or content.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Event signature verification failed.
    #[error("Invalid event signature")]
    InvalidSignature,

    /// Inbound relay text did not match any known message shape.
    #[error("Malformed relay message: {0}")]
    Parse(String),

    /// Hex encoding/decoding error.
    #[error("Hex encoding error: {0}")]
    HexError(String),

    /// Bech32 (NIP-19) encoding error.
    #[error("Bech32 encoding error: {0}")]
    Bech32(String),
}

impl NostrError {
    /// Returns true for the "not meant for me" decryption outcome.
    #[must_use]
    pub const fn is_decryption_failure(&self) -> bool {
        matches!(self, Self::Decryption(_))
    }
}

/// Result type for Nostr operations.
pub type Result<T> = std::result::Result<T, NostrError>;

impl From<hex::FromHexError> for NostrError {
    fn from(e: hex::FromHexError) -> Self {
        Self::HexError(e.to_string())
    }
}

//! Client configuration.
//!
//! Everything has a default, so a config file only needs the fields it
//! changes:
//!
//! ```json
//! {
//!   "relays": ["wss://relay.damus.io", "wss://nos.lol"],
//!   "secret_key": "nsec1...",
//!   "connect_timeout_ms": 5000
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::error::{ClientError, Result};
use crate::nostr::Keys;
use crate::relay::{
    validate_relay_url, ConnectionOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_SEND_TIMEOUT,
};

/// Configuration for a [`crate::client::NostrClient`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay URLs (`ws://` or `wss://`).
    pub relays: Vec<String>,

    /// Secret key as hex or `nsec`. A random key is generated when absent.
    /// Wiped from memory on drop.
    pub secret_key: Option<Zeroizing<String>>,

    /// Skip TLS certificate verification. Only for test relays.
    pub accept_invalid_certs: bool,

    /// Handshake timeout per relay, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Write timeout per relay, in milliseconds.
    pub send_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relays: Vec::new(),
            secret_key: None,
            accept_invalid_certs: false,
            connect_timeout_ms: millis(DEFAULT_CONNECT_TIMEOUT),
            send_timeout_ms: millis(DEFAULT_SEND_TIMEOUT),
        }
    }
}

impl ClientConfig {
    /// Creates an empty configuration with default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a relay URL.
    #[must_use]
    pub fn with_relay(mut self, relay: impl Into<String>) -> Self {
        self.relays.push(relay.into());
        self
    }

    /// Adds multiple relay URLs.
    #[must_use]
    pub fn with_relays(mut self, relays: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.relays.extend(relays.into_iter().map(Into::into));
        self
    }

    /// Sets the secret key (hex or `nsec`).
    #[must_use]
    pub fn with_secret_key(mut self, secret_key: impl Into<String>) -> Self {
        self.secret_key = Some(Zeroizing::new(secret_key.into()));
        self
    }

    /// Enables or disables TLS certificate verification bypass.
    #[must_use]
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Sets both timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, connect: Duration, send: Duration) -> Self {
        self.connect_timeout_ms = millis(connect);
        self.send_timeout_ms = millis(send);
        self
    }

    /// Parses a JSON configuration and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for invalid JSON or invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the file cannot be read or is
    /// invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&contents)
    }

    /// Checks relay URLs and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        for relay in &self.relays {
            validate_relay_url(relay).map_err(|e| ClientError::Config(e.to_string()))?;
        }
        if self.connect_timeout_ms == 0 {
            return Err(ClientError::Config(
                "connect_timeout_ms must be positive".to_string(),
            ));
        }
        if self.send_timeout_ms == 0 {
            return Err(ClientError::Config(
                "send_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Loads the configured key, or generates a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured key is not valid hex or `nsec`.
    pub fn keys(&self) -> Result<Keys> {
        match &self.secret_key {
            Some(secret) => Ok(Keys::parse(secret.as_str())?),
            None => Ok(Keys::generate()),
        }
    }

    /// Options passed to the relay manager.
    #[must_use]
    pub const fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("relays", &self.relays)
            .field(
                "secret_key",
                &self.secret_key.as_ref().map(|_| "<redacted>"),
            )
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("send_timeout_ms", &self.send_timeout_ms)
            .finish()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

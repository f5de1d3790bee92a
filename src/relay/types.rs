//! Types for relay management.
//!
//! This module defines relay connection states, read/write policies and the
//! options used when opening connections.

use std::fmt;
use std::time::Duration;

/// Default timeout for the websocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a single outbound write.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state for a relay.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RelayState {
    /// Registered but never opened.
    #[default]
    Disconnected,

    /// Handshake in progress.
    Connecting,

    /// Connected and ready.
    Open,

    /// Closed by us or by the relay.
    Closed,

    /// Connection or write failed. Not retried automatically.
    Failed {
        /// The reason for the failure.
        reason: String,
    },
}

impl RelayState {
    /// True if messages can be written to the relay.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// True if [`crate::relay::RelayManager::open_connections`] should try
    /// this relay.
    #[must_use]
    pub const fn can_open(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed | Self::Failed { .. })
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Which directions a relay is used for.
///
/// Subscriptions (`REQ`/`CLOSE`) go to readable relays; events go to
/// writable relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPolicy {
    /// Send subscriptions to this relay.
    pub read: bool,
    /// Publish events to this relay.
    pub write: bool,
}

impl RelayPolicy {
    /// Read and write.
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
    };

    /// Subscriptions only.
    pub const READ_ONLY: Self = Self {
        read: true,
        write: false,
    };

    /// Publishing only.
    pub const WRITE_ONLY: Self = Self {
        read: false,
        write: true,
    };
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self::READ_WRITE
    }
}

/// Status of a single relay connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConnectionStatus {
    /// The relay URL.
    pub url: String,
    /// Current connection state.
    pub state: RelayState,
    /// Read/write policy.
    pub policy: RelayPolicy,
}

/// Options applied when opening connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Handshake timeout per relay.
    pub connect_timeout: Duration,
    /// Timeout for one outbound write to one relay.
    pub send_timeout: Duration,
    /// Skip TLS certificate verification. Only for test relays.
    pub accept_invalid_certs: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            accept_invalid_certs: false,
        }
    }
}

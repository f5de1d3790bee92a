//! Relay connections and fan-out.
//!
//! # Architecture
//!
//! ```text
//! NostrClient
//!     │
//!     ▼
//! RelayManager ──── publish / REQ / CLOSE ───▶ RelayConnection × N ──▶ relays
//!     │                                              │
//!     │                                   receive task per relay
//!     ▼                                              │
//! MessagePool ◀──────── parse, verify, push ─────────┘
//! ```
//!
//! # Failure model
//!
//! - A relay that fails to connect, errors on read, or fails a write is
//!   marked `Failed` and skipped by fan-out. Its siblings are unaffected.
//! - Nothing reconnects on its own; `open_connections` may be called again.
//! - Malformed frames and events with a bad signature are dropped without
//!   closing the connection.
//!
//! # Policies
//!
//! | Command | Sent to |
//! |---------|---------|
//! | `EVENT` (via `publish_event`) | open relays with `write` |
//! | `REQ` / `CLOSE` | open relays with `read` |
//! | raw `publish_message` | every open relay |

mod connection;
mod error;
mod manager;
mod types;

pub use connection::{validate_relay_url, RelayConnection};
pub use error::{RelayError, RelayResult};
pub use manager::RelayManager;
pub use types::{
    ConnectionOptions, RelayConnectionStatus, RelayPolicy, RelayState, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_SEND_TIMEOUT,
};

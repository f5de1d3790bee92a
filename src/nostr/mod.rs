//! Nostr protocol primitives.
//!
//! Everything here is synchronous and transport-free:
//!
//! - [`Keys`] / [`PublicKey`]: secp256k1 identity, Schnorr signing, ECDH
//! - [`UnsignedEvent`] / [`Event`]: NIP-01 events, id computation, verification
//! - [`encryption`]: NIP-04 payloads for direct messages
//! - [`Filter`] / [`Filters`]: subscription filters and local matching
//! - [`ClientMessage`] / [`RelayMessage`]: the relay wire protocol
//!
//! # Example
//!
//! ```
//! use nostr_relay_client::nostr::{Keys, UnsignedEvent};
//!
//! let keys = Keys::generate();
//! let event = UnsignedEvent::text_note("hello", keys.public_key())
//!     .sign(&keys)
//!     .unwrap();
//! assert!(event.is_valid());
//! ```

mod error;
mod event;
mod filter;
mod keys;
mod message;
mod tags;

pub mod encryption;

pub use error::{NostrError, Result};
pub use event::{
    compute_id, Event, EventKind, UnsignedEvent, KIND_ENCRYPTED_DIRECT_MESSAGE, KIND_TEXT_NOTE,
};
pub use filter::{Filter, Filters};
pub use keys::{verify_signature, Keys, PublicKey, SharedSecret};
pub use message::{ClientMessage, RelayMessage};
pub use tags::{first_tag_value, tag_values, Tag, TagBuilder};

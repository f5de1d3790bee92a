//! Nostr relay client core.
//!
//! A client for the Nostr event-relay protocol that talks to several relays
//! at once: it publishes signed notes and NIP-04 encrypted direct messages to
//! all of them and merges what they send back into one deduplicated stream.
//!
//! # Layers
//!
//! - [`nostr`]: keys, events, filters, encryption and wire messages
//! - [`pool`]: the deduplicating inbound queue
//! - [`relay`]: websocket connections and fan-out
//! - [`client`]: the high-level facade

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

pub mod client;
pub mod nostr;
pub mod pool;
pub mod relay;

pub use client::{ClientConfig, ClientError, NostrClient, PoolHandler};
pub use pool::MessagePool;
pub use relay::{ConnectionOptions, RelayManager};

//! Client facade.
//!
//! [`NostrClient`] ties one identity to a [`crate::relay::RelayManager`] and
//! exposes the everyday operations:
//!
//! | Operation | Sends | Reads |
//! |-----------|-------|-------|
//! | `post` | kind 1 `EVENT` | |
//! | `send_dm` | kind 4 `EVENT` | |
//! | `get_posts` | `REQ` kind 1 | matching events |
//! | `receive_dms` | `REQ` kind 4, `#p` self | decrypted events |
//! | `subscribe_all` | | events, notices, EOSE |

mod config;
mod error;
mod nostr_client;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use nostr_client::{ClientState, NostrClient, PoolHandler};

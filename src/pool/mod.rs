//! Inbound message pool.
//!
//! Every relay receive task pushes into one [`MessagePool`]; consumers drain
//! its three queues independently:
//!
//! | Queue  | Contents                     | Deduplicated |
//! |--------|------------------------------|--------------|
//! | events | `EVENT` with relay + sub id  | by event id  |
//! | notices| `NOTICE` text                | no           |
//! | eose   | `EOSE` subscription id       | no           |
//!
//! Order is preserved per relay; across relays it is arrival order.

mod message_pool;
mod types;

pub use message_pool::MessagePool;
pub use types::{EoseMessage, EventMessage, NoticeMessage, PooledMessage};

//! Messages held by the pool, each tagged with the relay it came from.

use crate::nostr::{Event, RelayMessage};

/// An event delivered for a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    /// The (verified) event.
    pub event: Event,
    /// Subscription the relay matched it against.
    pub subscription_id: String,
    /// Relay that delivered it first.
    pub relay_url: String,
}

/// A human-readable notice from a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeMessage {
    /// Notice text.
    pub message: String,
    /// Relay that sent it.
    pub relay_url: String,
}

/// End of stored events for a subscription on one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EoseMessage {
    /// Subscription id.
    pub subscription_id: String,
    /// Relay that sent it.
    pub relay_url: String,
}

/// Anything the pool can queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PooledMessage {
    /// Goes to the event queue, deduplicated by id.
    Event(EventMessage),
    /// Goes to the notice queue.
    Notice(NoticeMessage),
    /// Goes to the EOSE queue.
    Eose(EoseMessage),
}

impl PooledMessage {
    /// Tags a parsed relay message with its origin.
    ///
    /// Returns `None` for messages the pool does not queue (`OK`).
    #[must_use]
    pub fn from_relay_message(relay_url: &str, message: RelayMessage) -> Option<Self> {
        let relay_url = relay_url.to_string();
        match message {
            RelayMessage::Event {
                subscription_id,
                event,
            } => Some(Self::Event(EventMessage {
                event,
                subscription_id,
                relay_url,
            })),
            RelayMessage::Notice { message } => {
                Some(Self::Notice(NoticeMessage { message, relay_url }))
            }
            RelayMessage::Eose { subscription_id } => Some(Self::Eose(EoseMessage {
                subscription_id,
                relay_url,
            })),
            RelayMessage::Ok { .. } => None,
        }
    }

    /// Relay the message came from.
    #[must_use]
    pub fn relay_url(&self) -> &str {
        match self {
            Self::Event(m) => &m.relay_url,
            Self::Notice(m) => &m.relay_url,
            Self::Eose(m) => &m.relay_url,
        }
    }
}

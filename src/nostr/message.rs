//! Relay protocol messages (NIP-01).
//!
//! - Client to relay: `EVENT`, `REQ`, `CLOSE`
//! - Relay to client: `EVENT`, `NOTICE`, `EOSE`, `OK`

use serde_json::{json, Value};

use crate::nostr::error::{NostrError, Result};
use crate::nostr::event::Event;
use crate::nostr::filter::Filters;

/// Messages sent from client to relay.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// Publish an event: `["EVENT", <event>]`.
    Event(Event),

    /// Open a subscription: `["REQ", <subscription_id>, <filter>...]`.
    Req {
        /// Client-chosen subscription id.
        subscription_id: String,
        /// Filters, OR-ed by the relay.
        filters: Filters,
    },

    /// Close a subscription: `["CLOSE", <subscription_id>]`.
    Close {
        /// Subscription to close.
        subscription_id: String,
    },
}

impl ClientMessage {
    /// Serializes to the JSON array text sent over the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let value = match self {
            Self::Event(event) => json!(["EVENT", event]),
            Self::Req {
                subscription_id,
                filters,
            } => {
                let mut array = vec![json!("REQ"), json!(subscription_id)];
                array.extend(filters.to_json_array()?);
                Value::Array(array)
            }
            Self::Close { subscription_id } => json!(["CLOSE", subscription_id]),
        };
        Ok(value.to_string())
    }
}

/// Messages received from a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// `["EVENT", <subscription_id>, <event>]`
    Event {
        /// Subscription the event matched.
        subscription_id: String,
        /// The event, not yet verified.
        event: Event,
    },

    /// `["NOTICE", <message>]`
    Notice {
        /// Human-readable text from the relay.
        message: String,
    },

    /// `["EOSE", <subscription_id>]`
    Eose {
        /// Subscription whose stored events are exhausted.
        subscription_id: String,
    },

    /// `["OK", <event_id>, <accepted>, <message>]`
    Ok {
        /// Event the result refers to.
        event_id: String,
        /// Whether the relay stored the event.
        accepted: bool,
        /// Relay-provided reason, possibly empty.
        message: String,
    },
}

impl RelayMessage {
    /// Parses raw text from a relay.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::Parse`] for anything that is not one of the
    /// known shapes. Callers drop these.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| NostrError::Parse(format!("invalid JSON: {e}")))?;
        let array = value
            .as_array()
            .ok_or_else(|| NostrError::Parse("message is not an array".to_string()))?;
        let msg_type = array
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| NostrError::Parse("first element not a string".to_string()))?;

        match msg_type {
            "EVENT" => {
                let subscription_id = string_at(array, 1, "EVENT subscription_id")?;
                let event_value = array
                    .get(2)
                    .ok_or_else(|| NostrError::Parse("EVENT message missing event".to_string()))?;
                let event: Event = serde_json::from_value(event_value.clone())
                    .map_err(|e| NostrError::Parse(format!("invalid event: {e}")))?;
                Ok(Self::Event {
                    subscription_id,
                    event,
                })
            }
            "NOTICE" => Ok(Self::Notice {
                message: string_at(array, 1, "NOTICE message")?,
            }),
            "EOSE" => Ok(Self::Eose {
                subscription_id: string_at(array, 1, "EOSE subscription_id")?,
            }),
            "OK" => {
                let event_id = string_at(array, 1, "OK event_id")?;
                let accepted = array
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| NostrError::Parse("OK accepted must be a boolean".to_string()))?;
                let message = array
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Self::Ok {
                    event_id,
                    accepted,
                    message,
                })
            }
            other => Err(NostrError::Parse(format!("unknown message type: {other}"))),
        }
    }
}

fn string_at(array: &[Value], index: usize, what: &str) -> Result<String> {
    array
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| NostrError::Parse(format!("{what} must be a string")))
}

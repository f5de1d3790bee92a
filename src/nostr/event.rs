//! Nostr event types.
//!
//! Events are built as an [`UnsignedEvent`] and only become an [`Event`]
//! through [`UnsignedEvent::sign`]. A signed `Event` exposes its fields
//! read-only, so nothing can change a signed field after the fact; an event
//! altered in transit fails [`Event::verify`].

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::nostr::encryption;
use crate::nostr::error::{NostrError, Result};
use crate::nostr::keys::{verify_signature, Keys, PublicKey, SharedSecret};
use crate::nostr::message::ClientMessage;
use crate::nostr::tags::{first_tag_value, Tag, TagBuilder};

/// Event kind for short text notes.
pub const KIND_TEXT_NOTE: u16 = 1;

/// Event kind for NIP-04 encrypted direct messages.
pub const KIND_ENCRYPTED_DIRECT_MESSAGE: u16 = 4;

/// Event kinds this client understands. Anything else is carried as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum EventKind {
    /// Kind 1.
    TextNote,
    /// Kind 4.
    EncryptedDirectMessage,
    /// Any other kind number.
    Other(u16),
}

impl EventKind {
    /// Returns the numeric kind.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::TextNote => KIND_TEXT_NOTE,
            Self::EncryptedDirectMessage => KIND_ENCRYPTED_DIRECT_MESSAGE,
            Self::Other(kind) => kind,
        }
    }
}

impl From<u16> for EventKind {
    fn from(kind: u16) -> Self {
        match kind {
            KIND_TEXT_NOTE => Self::TextNote,
            KIND_ENCRYPTED_DIRECT_MESSAGE => Self::EncryptedDirectMessage,
            other => Self::Other(other),
        }
    }
}

impl From<EventKind> for u16 {
    fn from(kind: EventKind) -> Self {
        kind.as_u16()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Serializes the fields covered by the event id per NIP-01:
/// `[0, pubkey, created_at, kind, tags, content]`.
fn canonical_serialization(
    pubkey: &str,
    created_at: i64,
    kind: EventKind,
    tags: &[Tag],
    content: &str,
) -> Result<String> {
    serde_json::to_string(&(0, pubkey, created_at, kind.as_u16(), tags, content))
        .map_err(NostrError::from)
}

/// Computes the event id: SHA-256 over the canonical serialization.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn compute_id(
    pubkey: &str,
    created_at: i64,
    kind: EventKind,
    tags: &[Tag],
    content: &str,
) -> Result<[u8; 32]> {
    let serialized = canonical_serialization(pubkey, created_at, kind, tags, content)?;
    Ok(Sha256::digest(serialized.as_bytes()).into())
}

/// An event that has not been signed yet. Fields are freely editable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    /// Author public key.
    pub pubkey: PublicKey,

    /// Unix timestamp when the event was created.
    pub created_at: i64,

    /// Event kind.
    pub kind: EventKind,

    /// Event tags.
    pub tags: Vec<Tag>,

    /// Event content.
    pub content: String,
}

impl UnsignedEvent {
    /// Creates an unsigned event stamped with the current time.
    #[must_use]
    pub fn new(pubkey: PublicKey, kind: EventKind, tags: Vec<Tag>, content: impl Into<String>) -> Self {
        Self {
            pubkey,
            created_at: Utc::now().timestamp(),
            kind,
            tags,
            content: content.into(),
        }
    }

    /// Creates a kind 1 text note.
    ///
    /// # Example
    ///
    /// ```
    /// use nostr_relay_client::nostr::{EventKind, Keys, UnsignedEvent};
    ///
    /// let keys = Keys::generate();
    /// let note = UnsignedEvent::text_note("hello", keys.public_key());
    /// assert_eq!(note.kind, EventKind::TextNote);
    /// ```
    #[must_use]
    pub fn text_note(content: impl Into<String>, author: PublicKey) -> Self {
        Self::new(author, EventKind::TextNote, Vec::new(), content)
    }

    /// Creates a kind 4 encrypted direct message addressed to `recipient`.
    ///
    /// The content is the `<ciphertext>?iv=<iv>` serialization and a single
    /// `p` tag names the recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypted_direct_message(
        author: PublicKey,
        recipient: &PublicKey,
        cleartext: &str,
        shared_secret: &SharedSecret,
    ) -> Result<Self> {
        let content = encryption::encrypt_content(shared_secret, cleartext)?;
        Ok(Self::new(
            author,
            EventKind::EncryptedDirectMessage,
            vec![TagBuilder::p_tag(recipient)],
            content,
        ))
    }

    /// Computes the id this event will have once signed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn compute_id(&self) -> Result<[u8; 32]> {
        compute_id(
            &self.pubkey.to_hex(),
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// Computes the id and signs it, producing an immutable [`Event`].
    ///
    /// # Errors
    ///
    /// Returns an error if `keys` does not belong to `pubkey` or signing fails.
    pub fn sign(self, keys: &Keys) -> Result<Event> {
        if keys.public_key() != self.pubkey {
            return Err(NostrError::Signing(
                "signing key does not match event pubkey".to_string(),
            ));
        }

        let id = self.compute_id()?;
        let sig = keys.sign(&id)?;

        Ok(Event {
            id: hex::encode(id),
            pubkey: self.pubkey.to_hex(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig,
        })
    }
}

/// A signed Nostr event.
///
/// # Structure
///
/// ```json
/// {
///   "id": "...",           // SHA256 of serialized event
///   "pubkey": "...",       // author public key
///   "created_at": 123456,  // Unix timestamp
///   "kind": 1,
///   "tags": [["p", "..."]],
///   "content": "...",
///   "sig": "..."           // Schnorr signature over id
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    id: String,
    pubkey: String,
    created_at: i64,
    kind: EventKind,
    tags: Vec<Tag>,
    content: String,
    sig: String,
}

impl Event {
    /// Event id (32-byte SHA-256, hex).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Author public key (hex) as received.
    #[must_use]
    pub fn pubkey(&self) -> &str {
        &self.pubkey
    }

    /// Author public key, parsed.
    ///
    /// # Errors
    ///
    /// Returns an error if the `pubkey` field is not a valid key.
    pub fn author(&self) -> Result<PublicKey> {
        PublicKey::from_hex(&self.pubkey)
    }

    /// Unix timestamp when the event was created.
    #[must_use]
    pub const fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Event tags.
    #[must_use]
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Event content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Schnorr signature (hex).
    #[must_use]
    pub fn sig(&self) -> &str {
        &self.sig
    }

    /// The recipient named by the first `p` tag, if any.
    #[must_use]
    pub fn recipient(&self) -> Option<PublicKey> {
        first_tag_value(&self.tags, "p").and_then(|hex| PublicKey::from_hex(hex).ok())
    }

    /// Recomputes the id and checks the signature against `pubkey`.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidEvent`] if the id does not match the
    /// content, or [`NostrError::InvalidSignature`] if the signature fails.
    pub fn verify(&self) -> Result<()> {
        let calculated_id = compute_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )?;
        let calculated_hex = hex::encode(calculated_id);

        // Constant-time comparison to prevent timing attacks
        if !bool::from(calculated_hex.as_bytes().ct_eq(self.id.as_bytes())) {
            return Err(NostrError::InvalidEvent("Event ID mismatch".to_string()));
        }

        let author = self.author()?;
        if verify_signature(&author, &calculated_id, &self.sig) {
            Ok(())
        } else {
            Err(NostrError::InvalidSignature)
        }
    }

    /// Returns true if [`Self::verify`] succeeds.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    /// Decrypts a kind 4 event with `keys`.
    ///
    /// Works from either side of the conversation: the counterparty is the
    /// author, or the `p` recipient when `keys` authored the event.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::Decryption`] if the content is not decryptable
    /// with the derived secret, or [`NostrError::InvalidEvent`] for a
    /// non-DM event.
    pub fn decrypt_direct_message(&self, keys: &Keys) -> Result<String> {
        if self.kind != EventKind::EncryptedDirectMessage {
            return Err(NostrError::InvalidEvent(format!(
                "kind {} is not an encrypted direct message",
                self.kind
            )));
        }

        let author = self.author()?;
        let counterparty = if author == keys.public_key() {
            self.recipient()
                .ok_or_else(|| NostrError::InvalidEvent("missing p tag".to_string()))?
        } else {
            author
        };

        let secret = keys.shared_secret(&counterparty)?;
        encryption::decrypt_content(&secret, &self.content)
    }

    /// Serializes this event to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(NostrError::from)
    }

    /// Deserializes an event from JSON. The result is not verified.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(NostrError::from)
    }

    /// Wire form for publishing: `["EVENT", <event>]`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_message(&self) -> Result<String> {
        ClientMessage::Event(self.clone()).to_json()
    }
}

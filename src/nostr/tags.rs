//! Tag builders and lookups for Nostr events.
//!
//! Tags are plain `Vec<String>` arrays on the wire. The client only builds
//! `p` tags (the DM recipient); the lookups read any tag name, which filter
//! matching uses for `#e`, `#p` and other single-letter constraints.

use crate::nostr::keys::PublicKey;

/// A single event tag, e.g. `["p", "<hex pubkey>"]`.
pub type Tag = Vec<String>;

/// Builder for Nostr event tags.
///
/// # Example
///
/// ```
/// use nostr_relay_client::nostr::{Keys, TagBuilder};
///
/// let keys = Keys::generate();
/// let p_tag = TagBuilder::p_tag(&keys.public_key());
/// assert_eq!(p_tag, vec!["p".to_string(), keys.pubkey_hex()]);
/// ```
pub struct TagBuilder;

impl TagBuilder {
    /// Builds the `p` tag referencing a public key.
    ///
    /// Encrypted direct messages carry exactly one of these, naming the
    /// recipient.
    #[must_use]
    pub fn p_tag(pubkey: &PublicKey) -> Tag {
        vec!["p".to_string(), pubkey.to_hex()]
    }
}

/// Returns the first value of the first tag named `name`.
#[must_use]
pub fn first_tag_value<'a>(tags: &'a [Tag], name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.first().map(String::as_str) == Some(name))
        .and_then(|tag| tag.get(1).map(String::as_str))
}

/// Iterates over the values of every tag named `name`.
pub fn tag_values<'a>(tags: &'a [Tag], name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    tags.iter()
        .filter(move |tag| tag.first().map(String::as_str) == Some(name))
        .filter_map(|tag| tag.get(1).map(String::as_str))
}

//! Subscription filters.
//!
//! A [`Filter`] is AND across its populated fields; a [`Filters`] list is OR
//! across filters. Unset fields are left out of the wire form and impose no
//! constraint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::nostr::error::Result;
use crate::nostr::event::{Event, EventKind};
use crate::nostr::keys::PublicKey;
use crate::nostr::tags::tag_values;

/// A single subscription filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Event ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// Author public keys (hex).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    /// Event kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<EventKind>>,

    /// Events referenced through `e` tags.
    #[serde(rename = "#e", skip_serializing_if = "Option::is_none")]
    pub event_refs: Option<Vec<String>>,

    /// Public keys referenced through `p` tags.
    #[serde(rename = "#p", skip_serializing_if = "Option::is_none")]
    pub pubkey_refs: Option<Vec<String>>,

    /// Only events created at or after this timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,

    /// Only events created at or before this timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,

    /// Cap on stored events returned before EOSE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Free-form extra constraints, passed through verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Filter {
    /// Creates a filter matching everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to the given event ids.
    #[must_use]
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts to events authored by any of `authors`.
    #[must_use]
    pub fn authors<I>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = PublicKey>,
    {
        self.authors = Some(authors.into_iter().map(|pk| pk.to_hex()).collect());
        self
    }

    /// Restricts to the given kinds.
    #[must_use]
    pub fn kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = EventKind>,
    {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Restricts to events with an `e` tag naming one of `event_ids`.
    #[must_use]
    pub fn event_refs<I, S>(mut self, event_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_refs = Some(event_ids.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts to events with a `p` tag naming one of `pubkeys`.
    #[must_use]
    pub fn pubkey_refs<I>(mut self, pubkeys: I) -> Self
    where
        I: IntoIterator<Item = PublicKey>,
    {
        self.pubkey_refs = Some(pubkeys.into_iter().map(|pk| pk.to_hex()).collect());
        self
    }

    /// Lower bound on `created_at`.
    #[must_use]
    pub const fn since(mut self, timestamp: i64) -> Self {
        self.since = Some(timestamp);
        self
    }

    /// Upper bound on `created_at`.
    #[must_use]
    pub const fn until(mut self, timestamp: i64) -> Self {
        self.until = Some(timestamp);
        self
    }

    /// Limit on stored events.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Adds a free-form constraint, e.g. `("#t", ["nostr"])`.
    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Serializes to the JSON object placed in a `REQ` message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Evaluates the filter locally against an event.
    ///
    /// Extra constraints of the form `"#x": [values]` are checked as tag
    /// filters; other extras are left to the relay.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == event.id()) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|author| author == event.pubkey()) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }
        if self.since.is_some_and(|since| event.created_at() < since) {
            return false;
        }
        if self.until.is_some_and(|until| event.created_at() > until) {
            return false;
        }
        if let Some(refs) = &self.event_refs {
            if !tag_matches(event, "e", refs) {
                return false;
            }
        }
        if let Some(refs) = &self.pubkey_refs {
            if !tag_matches(event, "p", refs) {
                return false;
            }
        }

        self.extra.iter().all(|(key, value)| {
            let Some(tag_name) = key.strip_prefix('#') else {
                return true;
            };
            let Some(wanted) = value.as_array() else {
                return true;
            };
            let wanted: Vec<String> = wanted
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            tag_matches(event, tag_name, &wanted)
        })
    }
}

fn tag_matches(event: &Event, tag_name: &str, wanted: &[String]) -> bool {
    tag_values(event.tags(), tag_name).any(|value| wanted.iter().any(|w| w == value))
}

/// An ordered list of filters, OR-ed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(Vec<Filter>);

impl Filters {
    /// Wraps a list of filters.
    #[must_use]
    pub const fn new(filters: Vec<Filter>) -> Self {
        Self(filters)
    }

    /// Appends a filter.
    pub fn push(&mut self, filter: Filter) {
        self.0.push(filter);
    }

    /// Iterates over the filters.
    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.0.iter()
    }

    /// Number of filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no filters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// One JSON object per filter, in order, for a `REQ` message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_array(&self) -> Result<Vec<Value>> {
        self.0.iter().map(Filter::to_json).collect()
    }

    /// True if any filter matches.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.0.iter().any(|filter| filter.matches(event))
    }
}

impl From<Filter> for Filters {
    fn from(filter: Filter) -> Self {
        Self(vec![filter])
    }
}

impl From<Vec<Filter>> for Filters {
    fn from(filters: Vec<Filter>) -> Self {
        Self(filters)
    }
}

impl<'a> IntoIterator for &'a Filters {
    type Item = &'a Filter;
    type IntoIter = std::slice::Iter<'a, Filter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

//! Core types: identifiers, events and queries.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Protocol-level subscription identifier carried in `REQ`/`CLOSE` frames.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        SubscriptionId(s.to_string())
    }
}

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        SubscriptionId(s)
    }
}

impl From<u64> for SubscriptionId {
    fn from(n: u64) -> Self {
        SubscriptionId(n.to_string())
    }
}

/// Unique identifier of an event (lower-case hex SHA-256).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "EventId({})", short)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        EventId(s.to_string())
    }
}

/// Normalized relay endpoint URL.
///
/// Surrounding whitespace is trimmed, scheme and host are lower-cased and a
/// trailing `/` is dropped, so `"WSS://Relay.Example/"` and
/// `"wss://relay.example"` name the same relay.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RelayUrl(String);

impl RelayUrl {
    pub fn new(raw: &str) -> Self {
        RelayUrl(normalize_url(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let (scheme, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
        None => (None, trimmed),
    };
    let (host, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    let host = host.to_ascii_lowercase();
    let path = path.strip_suffix('/').unwrap_or(path);

    match scheme {
        Some(scheme) => format!("{}://{}{}", scheme, host, path),
        None => format!("{}{}", host, path),
    }
}

impl fmt::Debug for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelayUrl({})", self.0)
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelayUrl {
    fn from(s: &str) -> Self {
        RelayUrl::new(s)
    }
}

impl From<String> for RelayUrl {
    fn from(s: String) -> Self {
        RelayUrl::new(&s)
    }
}

impl From<&RelayUrl> for RelayUrl {
    fn from(url: &RelayUrl) -> Self {
        url.clone()
    }
}

impl From<RelayUrl> for String {
    fn from(url: RelayUrl) -> Self {
        url.0
    }
}

/// A signed protocol event as delivered by relays.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    pub content: String,
    #[serde(default)]
    pub sig: String,
}

impl Event {
    /// Build an unsigned event with its canonical id filled in.
    pub fn unsigned(pubkey: &str, created_at: u64, kind: u32, content: &str) -> Self {
        let mut event = Event {
            id: EventId(String::new()),
            pubkey: pubkey.to_string(),
            created_at,
            kind,
            tags: Vec::new(),
            content: content.to_string(),
            sig: String::new(),
        };
        event.id = event.compute_id();
        event
    }

    /// Canonical id: SHA-256 over `[0, pubkey, created_at, kind, tags, content]`.
    pub fn compute_id(&self) -> EventId {
        let canonical = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content
        ]);
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        EventId(hex::encode(hasher.finalize()))
    }

    /// Whether `id` matches the canonical id. Signatures are not checked.
    pub fn has_canonical_id(&self) -> bool {
        self.id == self.compute_id()
    }
}

/// One filter of a query. Unset fields are omitted on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Tag filters keyed as `#e`, `#p`, ...
    #[serde(flatten)]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u32>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn authors<S: Into<String>>(mut self, authors: impl IntoIterator<Item = S>) -> Self {
        self.authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    pub fn ids<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add a single-letter tag filter, e.g. `tag('e', [...])` → `"#e": [...]`.
    pub fn tag<S: Into<String>>(mut self, letter: char, values: impl IntoIterator<Item = S>) -> Self {
        self.tags.insert(
            format!("#{}", letter),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }
}

/// The filter set sent with a `REQ`. Serialized as a sequence of filters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(pub Vec<Filter>);

impl Query {
    pub fn filters(&self) -> &[Filter] {
        &self.0
    }
}

impl From<Filter> for Query {
    fn from(filter: Filter) -> Self {
        Query(vec![filter])
    }
}

impl From<Vec<Filter>> for Query {
    fn from(filters: Vec<Filter>) -> Self {
        Query(filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_url_normalization() {
        assert_eq!(RelayUrl::new(" WSS://Relay.Example/ ").as_str(), "wss://relay.example");
        assert_eq!(RelayUrl::new("wss://a"), RelayUrl::new("wss://a/"));
        assert_eq!(
            RelayUrl::new("wss://Relay.Example/Path/").as_str(),
            "wss://relay.example/Path"
        );
    }

    #[test]
    fn test_filter_omits_unset_fields() {
        let filter = Filter::new().kinds([1]).tag('e', ["abc"]);
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, r##"{"kinds":[1],"#e":["abc"]}"##);

        let parsed: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, filter);
    }

    #[test]
    fn test_canonical_event_id() {
        let event = Event::unsigned("ab", 1_700_000_000, 1, "hello");
        assert_eq!(event.id.as_str().len(), 64);
        assert!(event.has_canonical_id());

        let mut tampered = event.clone();
        tampered.content = "bye".to_string();
        assert!(!tampered.has_canonical_id());
    }

    #[test]
    fn test_subscription_id_from_counter() {
        assert_eq!(SubscriptionId::from(0u64).as_str(), "0");
        assert_eq!(SubscriptionId::from("feed").to_string(), "feed");
    }
}

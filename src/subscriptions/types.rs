//! Subscription configuration and state types.

use crate::types::{Query, RelayUrl};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for a subscription.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionConfig {
    /// Target relays, in caller order. Duplicates collapse to one relay.
    pub relay_urls: Vec<RelayUrl>,

    /// Filter set; required before the subscription can be opened.
    pub query: Option<Query>,

    /// Explicit subscription id. When unset the multiplexer assigns one.
    pub name: Option<String>,
}

impl SubscriptionConfig {
    pub fn new<U: Into<RelayUrl>>(relay_urls: impl IntoIterator<Item = U>) -> Self {
        Self {
            relay_urls: relay_urls.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<Query>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Lifecycle state. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Created, never opened.
    #[serde(rename = "initial")]
    Init,
    Open,
    Closed,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriptionState::Init => "initial",
            SubscriptionState::Open => "open",
            SubscriptionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

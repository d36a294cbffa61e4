//! Relay pool: one canonical relay per URL, kept alive by claims.

use super::{Relay, RelayConnector, RelayRegistry};
use crate::types::{RelayUrl, SubscriptionId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pool configuration.
#[derive(Clone, Debug)]
pub struct RelayPoolConfig {
    /// Disconnect a relay once its last claim is released.
    /// Default: true
    pub disconnect_unclaimed: bool,
}

impl Default for RelayPoolConfig {
    fn default() -> Self {
        Self {
            disconnect_unclaimed: true,
        }
    }
}

/// Deduplicates relay connections by URL and reference-counts their owners.
pub struct RelayPool {
    config: RelayPoolConfig,
    connector: Arc<dyn RelayConnector>,
    /// Canonical relay per URL. Entries are never evicted.
    relays: RwLock<HashMap<RelayUrl, Arc<dyn Relay>>>,
    /// Claim counts per URL, per owner.
    claims: Mutex<HashMap<RelayUrl, HashMap<SubscriptionId, usize>>>,
}

impl RelayPool {
    pub fn new(connector: Arc<dyn RelayConnector>) -> Self {
        Self::with_config(connector, RelayPoolConfig::default())
    }

    pub fn with_config(connector: Arc<dyn RelayConnector>, config: RelayPoolConfig) -> Self {
        Self {
            config,
            connector,
            relays: RwLock::new(HashMap::new()),
            claims: Mutex::new(HashMap::new()),
        }
    }

    /// The relay for `url`, if it has been resolved before.
    pub fn relay(&self, url: &RelayUrl) -> Option<Arc<dyn Relay>> {
        self.relays.read().get(url).cloned()
    }

    /// URLs of every relay in the pool.
    pub fn relay_urls(&self) -> Vec<RelayUrl> {
        let mut urls: Vec<RelayUrl> = self.relays.read().keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Total outstanding claims against `url`.
    pub fn claim_count(&self, url: &RelayUrl) -> usize {
        self.claims
            .lock()
            .get(url)
            .map(|owners| owners.values().sum())
            .unwrap_or(0)
    }

    /// Outstanding claims `owner` holds against `url`.
    pub fn owner_claims(&self, url: &RelayUrl, owner: &SubscriptionId) -> usize {
        self.claims
            .lock()
            .get(url)
            .and_then(|owners| owners.get(owner).copied())
            .unwrap_or(0)
    }
}

impl RelayRegistry for RelayPool {
    fn resolve(&self, url: &RelayUrl) -> Arc<dyn Relay> {
        if let Some(relay) = self.relays.read().get(url) {
            return Arc::clone(relay);
        }

        let mut relays = self.relays.write();
        // Another caller may have won the race between the two locks.
        if let Some(relay) = relays.get(url) {
            return Arc::clone(relay);
        }

        debug!(relay = %url, "opening relay");
        let relay = self.connector.open(url);
        relay.connect();
        relays.insert(url.clone(), Arc::clone(&relay));
        relay
    }

    fn add_claim(&self, url: &RelayUrl, owner: &SubscriptionId) {
        {
            let mut claims = self.claims.lock();
            *claims
                .entry(url.clone())
                .or_default()
                .entry(owner.clone())
                .or_insert(0) += 1;
        }

        let relay = self.resolve(url);
        if !relay.is_connected() {
            debug!(relay = %url, "reconnecting claimed relay");
            relay.connect();
        }
    }

    fn remove_claim(&self, url: &RelayUrl, owner: &SubscriptionId) {
        let unclaimed = {
            let mut claims = self.claims.lock();
            let Some(owners) = claims.get_mut(url) else {
                warn!(relay = %url, owner = %owner, "released a claim that was never taken");
                return;
            };
            match owners.get_mut(owner) {
                Some(count) if *count > 1 => *count -= 1,
                Some(_) => {
                    owners.remove(owner);
                }
                None => {
                    warn!(relay = %url, owner = %owner, "released a claim that was never taken");
                    return;
                }
            }
            let unclaimed = owners.is_empty();
            if unclaimed {
                claims.remove(url);
            }
            unclaimed
        };

        if unclaimed && self.config.disconnect_unclaimed {
            if let Some(relay) = self.relay(url) {
                debug!(relay = %url, "last claim released, disconnecting");
                relay.disconnect();
            }
        }
    }
}

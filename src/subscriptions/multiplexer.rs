//! Subscription factory owning id assignment.

use crate::error::{MuxError, Result};
use crate::relay::RelayRegistry;
use crate::types::SubscriptionId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::subscription::Subscription;
use super::types::SubscriptionConfig;

type LiveIds = Mutex<HashSet<SubscriptionId>>;

/// Keeps an id reserved while the subscription holding it is alive.
pub(crate) struct IdLease {
    id: SubscriptionId,
    live: Weak<LiveIds>,
}

impl Drop for IdLease {
    fn drop(&mut self) {
        if let Some(live) = self.live.upgrade() {
            live.lock().remove(&self.id);
        }
    }
}

/// Creates subscriptions against one relay registry and guarantees that no
/// two live subscriptions share an id.
pub struct Multiplexer {
    registry: Arc<dyn RelayRegistry>,
    /// Counter for generating subscription ids.
    next_id: AtomicU64,
    /// Ids of subscriptions that have not been dropped yet.
    live: Arc<LiveIds>,
}

impl Multiplexer {
    pub fn new(registry: Arc<dyn RelayRegistry>) -> Self {
        Self {
            registry,
            next_id: AtomicU64::new(0),
            live: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn registry(&self) -> &Arc<dyn RelayRegistry> {
        &self.registry
    }

    /// Create a subscription.
    ///
    /// The id is `config.name` when set, otherwise the next counter value
    /// (`"0"`, `"1"`, ...) not currently in use. A name that is already live
    /// fails with [`MuxError::DuplicateSubscription`].
    pub fn subscribe(&self, config: SubscriptionConfig) -> Result<Subscription> {
        let id = {
            let mut live = self.live.lock();
            let id = match &config.name {
                Some(name) => {
                    let id = SubscriptionId::from(name.as_str());
                    if live.contains(&id) {
                        return Err(MuxError::DuplicateSubscription(id));
                    }
                    id
                }
                None => loop {
                    let id = SubscriptionId::from(self.next_id.fetch_add(1, Ordering::SeqCst));
                    if !live.contains(&id) {
                        break id;
                    }
                },
            };
            live.insert(id.clone());
            id
        };

        let lease = IdLease {
            id: id.clone(),
            live: Arc::downgrade(&self.live),
        };
        Ok(Subscription::build(
            id,
            config,
            Arc::clone(&self.registry),
            Some(lease),
        ))
    }

    /// Number of subscriptions created here that are still alive.
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    pub fn is_live(&self, id: &SubscriptionId) -> bool {
        self.live.lock().contains(id)
    }
}

//! The relay-multiplexed subscription.

use crate::error::{MuxError, Result};
use crate::message::{ClientMessage, IncomingEvent};
use crate::relay::{same_relay, Relay, RelayRegistry};
use crate::stream::{EventStream, Listener};
use crate::types::{Event, EventId, Query, RelayUrl, SubscriptionId};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace};

use super::multiplexer::IdLease;
use super::types::{SubscriptionConfig, SubscriptionState};

/// Mutable subscription state, guarded by one lock.
struct Core {
    state: SubscriptionState,
    query: Option<Query>,
    relay_urls: Vec<RelayUrl>,
    /// Resolved relays, one per distinct URL in `relay_urls`.
    relays: Vec<Arc<dyn Relay>>,
    /// Event ids delivered during the current open period.
    seen_events: HashSet<EventId>,
    /// Relays with an active inbound listener. Each entry also holds one claim.
    relay_listeners: HashMap<RelayUrl, Listener>,
}

/// Relay sends and claim changes collected under `core` and applied after it
/// is released, while the operation lock is still held.
#[derive(Default)]
struct Effects {
    claims: Vec<RelayUrl>,
    sends: Vec<(Arc<dyn Relay>, ClientMessage)>,
    releases: Vec<RelayUrl>,
}

impl Effects {
    /// New claims go first and released claims last, so a relay that stays
    /// in the target set never drops to zero claims in between.
    fn apply(self, owner: &SubscriptionId, registry: &dyn RelayRegistry) {
        for url in &self.claims {
            registry.add_claim(url, owner);
        }
        for (relay, message) in self.sends {
            relay.send(message);
        }
        for url in &self.releases {
            registry.remove_claim(url, owner);
        }
    }
}

struct Inner {
    id: SubscriptionId,
    name: Option<String>,
    registry: Arc<dyn RelayRegistry>,
    events: EventStream<Event>,
    /// Serializes operations, including their relay side effects and event
    /// emission. Always taken before `core`. Reentrant so that an output
    /// listener may call back into the subscription on the emitting thread.
    ops: ReentrantMutex<()>,
    core: Mutex<Core>,
    _lease: Option<IdLease>,
}

impl Inner {
    /// Name when set, otherwise the id.
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    fn route(&self, incoming: &IncomingEvent) {
        if incoming.subscription_id != self.id {
            return;
        }

        // Held through emit: `close` never returns with an accepted event
        // still in flight.
        let _ops = self.ops.lock();
        let accepted = {
            let mut core = self.core.lock();
            core.state == SubscriptionState::Open
                && core.seen_events.insert(incoming.body.id.clone())
        };

        if accepted {
            trace!(subscription = %self.id, event = %incoming.body.id, "event accepted");
            self.events.emit(&incoming.body);
        } else {
            trace!(subscription = %self.id, event = %incoming.body.id, "event dropped");
        }
    }

    fn unbind(core: &mut Core, effects: &mut Effects) {
        for (url, listener) in core.relay_listeners.drain() {
            listener.unsubscribe();
            effects.releases.push(url);
        }
    }

    fn close(&self) -> bool {
        let _ops = self.ops.lock();
        let mut effects = Effects::default();
        {
            let mut core = self.core.lock();
            if core.state != SubscriptionState::Open {
                return false;
            }

            core.state = SubscriptionState::Closed;
            for relay in &core.relays {
                effects
                    .sends
                    .push((Arc::clone(relay), ClientMessage::close(&self.id)));
            }
            core.seen_events.clear();
            Self::unbind(&mut core, &mut effects);
        }
        effects.apply(&self.id, self.registry.as_ref());

        info!(subscription = %self.label(), "subscription closed");
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.close();
    }
}

/// One logical query served by any number of relays under a single id.
///
/// All methods take `&self`. Operations are serialized by an internal lock
/// that covers their relay side effects, so those reach the relays and the
/// registry in the same order as the state changes behind them. Output
/// listeners run under that lock: a listener may call back into this
/// subscription, but must not block on another thread that does.
pub struct Subscription {
    inner: Arc<Inner>,
}

impl Subscription {
    /// Create a subscription with an explicit id. The caller is responsible
    /// for the id being unique among live subscriptions; see
    /// [`Multiplexer::subscribe`](super::Multiplexer::subscribe) for managed ids.
    pub fn new(
        id: impl Into<SubscriptionId>,
        config: SubscriptionConfig,
        registry: Arc<dyn RelayRegistry>,
    ) -> Self {
        Self::build(id.into(), config, registry, None)
    }

    pub(crate) fn build(
        id: SubscriptionId,
        config: SubscriptionConfig,
        registry: Arc<dyn RelayRegistry>,
        lease: Option<IdLease>,
    ) -> Self {
        let relays = resolve_all(registry.as_ref(), &config.relay_urls);

        Self {
            inner: Arc::new(Inner {
                id,
                name: config.name,
                registry,
                events: EventStream::new(),
                ops: ReentrantMutex::new(()),
                core: Mutex::new(Core {
                    state: SubscriptionState::Init,
                    query: config.query,
                    relay_urls: config.relay_urls,
                    relays,
                    seen_events: HashSet::new(),
                    relay_listeners: HashMap::new(),
                }),
                _lease: lease,
            }),
        }
    }

    // --- Accessors ---

    /// Id used on the wire for `REQ`, `CLOSE` and inbound routing.
    pub fn id(&self) -> &SubscriptionId {
        &self.inner.id
    }

    /// Name given at construction, if any.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        self.inner.core.lock().state
    }

    /// Whether the subscription is currently receiving.
    pub fn is_open(&self) -> bool {
        self.state() == SubscriptionState::Open
    }

    /// Current query, if one has been set.
    pub fn query(&self) -> Option<Query> {
        self.inner.core.lock().query.clone()
    }

    /// Target relay URLs as last configured, duplicates included.
    pub fn relay_urls(&self) -> Vec<RelayUrl> {
        self.inner.core.lock().relay_urls.clone()
    }

    /// URLs of relays with an active listener, sorted.
    pub fn bound_relays(&self) -> Vec<RelayUrl> {
        let core = self.inner.core.lock();
        let mut urls: Vec<RelayUrl> = core.relay_listeners.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Number of distinct event ids delivered in the current open period.
    pub fn seen_count(&self) -> usize {
        self.inner.core.lock().seen_events.len()
    }

    /// Merged, deduplicated output stream.
    pub fn events(&self) -> &EventStream<Event> {
        &self.inner.events
    }

    // --- Lifecycle ---

    /// Start receiving: send `REQ` to every relay and listen to each of them.
    ///
    /// Fails with [`MuxError::NoQuery`] when no query is set and with
    /// [`MuxError::Closed`] once the subscription has been closed. Opening an
    /// open subscription does nothing.
    pub fn open(&self) -> Result<&Self> {
        let id = &self.inner.id;
        let _ops = self.inner.ops.lock();
        let mut effects = Effects::default();
        let relay_count;
        {
            let mut core = self.inner.core.lock();
            let Some(query) = core.query.clone() else {
                return Err(MuxError::NoQuery(id.clone()));
            };
            match core.state {
                SubscriptionState::Open => return Ok(self),
                SubscriptionState::Closed => return Err(MuxError::Closed(id.clone())),
                SubscriptionState::Init => {}
            }

            core.state = SubscriptionState::Open;
            for relay in &core.relays {
                effects
                    .sends
                    .push((Arc::clone(relay), ClientMessage::req(id, &query)));
            }
            self.bind(&mut core, &mut effects);
            relay_count = core.relays.len();
        }
        effects.apply(id, self.inner.registry.as_ref());

        info!(subscription = %self.inner.label(), relays = relay_count, "subscription opened");
        Ok(self)
    }

    /// Stop receiving: send `CLOSE` to every relay, forget seen events and
    /// release every relay. Does nothing unless open.
    pub fn close(&self) -> &Self {
        self.inner.close();
        self
    }

    /// Replace the query. When open, `REQ` is re-sent to every relay under
    /// the same id.
    pub fn set_query(&self, query: impl Into<Query>) -> &Self {
        let query = query.into();
        let _ops = self.inner.ops.lock();
        let mut effects = Effects::default();
        {
            let mut core = self.inner.core.lock();
            if core.state == SubscriptionState::Open {
                for relay in &core.relays {
                    effects
                        .sends
                        .push((Arc::clone(relay), ClientMessage::req(&self.inner.id, &query)));
                }
            }
            core.query = Some(query);
        }
        effects.apply(&self.inner.id, self.inner.registry.as_ref());
        self
    }

    /// Retarget the subscription at a new relay set.
    ///
    /// Listener bindings are always rebuilt. When open, relays leaving the
    /// set get `CLOSE` (only if connected) and relays joining it get `REQ`;
    /// relays in both sets are left alone.
    pub fn set_relays<U: Into<RelayUrl>>(&self, urls: impl IntoIterator<Item = U>) -> &Self {
        let id = &self.inner.id;
        let urls: Vec<RelayUrl> = urls.into_iter().map(Into::into).collect();
        let relays = resolve_all(self.inner.registry.as_ref(), &urls);

        let _ops = self.inner.ops.lock();
        let mut effects = Effects::default();
        {
            let mut core = self.inner.core.lock();
            Inner::unbind(&mut core, &mut effects);

            let open = core.state == SubscriptionState::Open;
            if open {
                for old in &core.relays {
                    let kept = relays.iter().any(|relay| same_relay(relay, old));
                    if !kept && old.is_connected() {
                        debug!(subscription = %id, relay = %old.url(), "relay removed");
                        effects
                            .sends
                            .push((Arc::clone(old), ClientMessage::close(id)));
                    }
                }
                if let Some(query) = &core.query {
                    for new in &relays {
                        let known = core.relays.iter().any(|relay| same_relay(relay, new));
                        if !known {
                            debug!(subscription = %id, relay = %new.url(), "relay added");
                            effects
                                .sends
                                .push((Arc::clone(new), ClientMessage::req(id, query)));
                        }
                    }
                }
            }

            core.relay_urls = urls;
            core.relays = relays;

            if open {
                self.bind(&mut core, &mut effects);
            }
        }
        effects.apply(id, self.inner.registry.as_ref());
        self
    }

    /// Forget delivered event ids so they can be delivered again.
    pub fn forget_events(&self) -> &Self {
        self.inner.core.lock().seen_events.clear();
        self
    }

    /// Send a message to every current relay.
    pub fn send(&self, message: ClientMessage) -> &Self {
        let _ops = self.inner.ops.lock();
        let relays = self.inner.core.lock().relays.clone();
        for relay in relays {
            relay.send(message.clone());
        }
        self
    }

    /// Listen to (and claim) every relay that has no listener yet.
    fn bind(&self, core: &mut Core, effects: &mut Effects) {
        for relay in &core.relays {
            if core.relay_listeners.contains_key(relay.url()) {
                continue;
            }

            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let listener = relay.events().subscribe_fn(move |incoming: &IncomingEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.route(incoming);
                }
            });
            core.relay_listeners.insert(relay.url().clone(), listener);
            effects.claims.push(relay.url().clone());
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("state", &core.state)
            .field("relay_urls", &core.relay_urls)
            .field("seen_events", &core.seen_events.len())
            .finish()
    }
}

/// Resolve URLs to canonical relays, one per distinct relay, in first-seen order.
fn resolve_all(registry: &dyn RelayRegistry, urls: &[RelayUrl]) -> Vec<Arc<dyn Relay>> {
    let mut relays: Vec<Arc<dyn Relay>> = Vec::with_capacity(urls.len());
    for url in urls {
        let relay = registry.resolve(url);
        if !relays.iter().any(|known| same_relay(known, &relay)) {
            relays.push(relay);
        }
    }
    relays
}

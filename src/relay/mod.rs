//! Relay collaborators.
//!
//! A [`Relay`] is one logical connection to one endpoint. A
//! [`RelayRegistry`] hands out one canonical relay per URL and keeps track of
//! which owners still need each connection ("claims"). Subscriptions only talk
//! to these traits; transport, reconnect and backoff live behind them.

mod memory;
mod pool;

pub use memory::{MemoryConnector, MemoryRelay};
pub use pool::{RelayPool, RelayPoolConfig};

use crate::message::{ClientMessage, IncomingEvent};
use crate::stream::EventStream;
use crate::types::{RelayUrl, SubscriptionId};
use std::sync::Arc;

/// One logical connection to a relay endpoint.
pub trait Relay: Send + Sync {
    fn url(&self) -> &RelayUrl;

    /// Best-effort, non-blocking send. Failures are not reported.
    fn send(&self, message: ClientMessage);

    /// Current transport state.
    fn is_connected(&self) -> bool;

    /// Inbound events for every subscription multiplexed on this connection.
    fn events(&self) -> &EventStream<IncomingEvent>;

    fn connect(&self);

    fn disconnect(&self);
}

/// Canonical relay lookup plus claim counting.
pub trait RelayRegistry: Send + Sync {
    /// Same URL always yields the same handle.
    fn resolve(&self, url: &RelayUrl) -> Arc<dyn Relay>;

    fn add_claim(&self, url: &RelayUrl, owner: &SubscriptionId);

    fn remove_claim(&self, url: &RelayUrl, owner: &SubscriptionId);
}

/// Creates relay connections for a [`RelayPool`].
pub trait RelayConnector: Send + Sync {
    fn open(&self, url: &RelayUrl) -> Arc<dyn Relay>;
}

/// Whether two handles refer to the same relay instance.
pub fn same_relay(a: &Arc<dyn Relay>, b: &Arc<dyn Relay>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

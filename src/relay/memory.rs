//! In-process relay with no transport.
//!
//! Outgoing messages are recorded in an outbox; inbound traffic is injected
//! with [`MemoryRelay::deliver`] or [`MemoryRelay::receive_json`].

use super::{Relay, RelayConnector};
use crate::error::Result;
use crate::message::{ClientMessage, IncomingEvent, RelayMessage};
use crate::stream::EventStream;
use crate::types::{Event, RelayUrl, SubscriptionId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Loopback relay recording everything sent to it.
pub struct MemoryRelay {
    url: RelayUrl,
    connected: AtomicBool,
    /// Messages sent through this relay, oldest first.
    outbox: Mutex<Vec<ClientMessage>>,
    events: EventStream<IncomingEvent>,
}

impl MemoryRelay {
    /// Create a relay in the disconnected state.
    pub fn new(url: impl Into<RelayUrl>) -> Self {
        Self {
            url: url.into(),
            connected: AtomicBool::new(false),
            outbox: Mutex::new(Vec::new()),
            events: EventStream::new(),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Copy of the outbox.
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.outbox.lock().clone()
    }

    /// Drain the outbox.
    pub fn take_sent(&self) -> Vec<ClientMessage> {
        std::mem::take(&mut *self.outbox.lock())
    }

    /// Push an event tagged for `subscription_id` onto the inbound stream.
    pub fn deliver(&self, subscription_id: impl Into<SubscriptionId>, event: Event) {
        self.events.emit(&IncomingEvent {
            subscription_id: subscription_id.into(),
            body: event,
        });
    }

    /// Feed a raw relay frame. `EVENT` frames go to the inbound stream,
    /// `EOSE` and `NOTICE` are only logged.
    pub fn receive_json(&self, frame: &str) -> Result<()> {
        match RelayMessage::from_json(frame)? {
            RelayMessage::Event(incoming) => self.events.emit(&incoming),
            RelayMessage::Eose(id) => {
                debug!(relay = %self.url, subscription = %id, "end of stored events")
            }
            RelayMessage::Notice(text) => {
                debug!(relay = %self.url, notice = %text, "relay notice")
            }
        }
        Ok(())
    }
}

impl Relay for MemoryRelay {
    fn url(&self) -> &RelayUrl {
        &self.url
    }

    fn send(&self, message: ClientMessage) {
        trace!(relay = %self.url, verb = message.verb(), "send");
        self.outbox.lock().push(message);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn events(&self) -> &EventStream<IncomingEvent> {
        &self.events
    }

    fn connect(&self) {
        self.set_connected(true);
    }

    fn disconnect(&self) {
        self.set_connected(false);
    }
}

/// Connector producing [`MemoryRelay`]s and remembering them by URL so the
/// concrete relay can be inspected.
#[derive(Default)]
pub struct MemoryConnector {
    relays: RwLock<HashMap<RelayUrl, Arc<MemoryRelay>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The relay opened for `url`, if any.
    pub fn relay(&self, url: impl Into<RelayUrl>) -> Option<Arc<MemoryRelay>> {
        self.relays.read().get(&url.into()).cloned()
    }

    /// Number of relays opened so far.
    pub fn opened(&self) -> usize {
        self.relays.read().len()
    }
}

impl RelayConnector for MemoryConnector {
    fn open(&self, url: &RelayUrl) -> Arc<dyn Relay> {
        let mut relays = self.relays.write();
        let relay = relays
            .entry(url.clone())
            .or_insert_with(|| Arc::new(MemoryRelay::new(url)));
        Arc::clone(relay) as Arc<dyn Relay>
    }
}

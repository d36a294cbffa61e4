//! Relay-multiplexed subscriptions.
//!
//! A [`Subscription`] owns one protocol-level query id and fans it out to a
//! set of relays:
//! - `REQ`/`CLOSE` control messages follow open, close and reconfiguration
//! - inbound events from every relay are filtered to the subscription's id
//! - duplicates (same event id from several relays) are dropped
//!
//! # Example
//!
//! ```ignore
//! let pool = Arc::new(RelayPool::new(Arc::new(MemoryConnector::new())));
//! let mux = Multiplexer::new(pool);
//!
//! let sub = mux.subscribe(
//!     SubscriptionConfig::new(["wss://a", "wss://b"]).with_query(Filter::new().kinds([1])),
//! )?;
//! let events = sub.events().subscribe();
//! sub.open()?;
//!
//! while let Ok(event) = events.recv() {
//!     println!("{}: {}", event.id, event.content);
//! }
//! ```

mod multiplexer;
mod subscription;
mod types;

pub use multiplexer::Multiplexer;
pub use subscription::Subscription;
pub use types::{SubscriptionConfig, SubscriptionState};

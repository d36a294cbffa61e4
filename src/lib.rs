//! # Relay Subscription Multiplexer
//!
//! Issues one filtered query to many independently connected relays and
//! merges what comes back into a single deduplicated event stream.
//!
//! ## Core Concepts
//!
//! - **Relays**: one connection per endpoint, shared by many subscriptions
//! - **Claims**: reference counts that keep a relay connection alive
//! - **Subscriptions**: one query id fanned out to a relay set, with
//!   `REQ`/`CLOSE` accounting as the set changes
//! - **Dedup**: each event id is delivered once per open period
//!
//! ## Example
//!
//! ```ignore
//! use relaymux::{Filter, MemoryConnector, Multiplexer, RelayPool, SubscriptionConfig};
//! use std::sync::Arc;
//!
//! let connector = Arc::new(MemoryConnector::new());
//! let pool = Arc::new(RelayPool::new(connector.clone()));
//! let mux = Multiplexer::new(pool);
//!
//! let sub = mux.subscribe(
//!     SubscriptionConfig::new(["wss://a", "wss://b"]).with_query(Filter::new().kinds([1])),
//! )?;
//! let feed = sub.events().subscribe();
//! sub.open()?;
//!
//! // Later: retarget without changing the subscription id
//! sub.set_relays(["wss://b", "wss://c"]);
//! ```

pub mod error;
pub mod message;
pub mod relay;
pub mod stream;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{MuxError, Result};
pub use message::{ClientMessage, IncomingEvent, RelayMessage};
pub use relay::{
    same_relay, MemoryConnector, MemoryRelay, Relay, RelayConnector, RelayPool, RelayPoolConfig,
    RelayRegistry,
};
pub use stream::{EventReceiver, EventStream, Listener};
pub use subscriptions::{Multiplexer, Subscription, SubscriptionConfig, SubscriptionState};
pub use types::*;

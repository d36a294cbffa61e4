//! Error handling and edge case tests.

use relaymux::{
    Filter, MemoryConnector, MuxError, Multiplexer, Relay, RelayMessage, RelayPool,
    RelayRegistry, RelayUrl, SubscriptionConfig, SubscriptionId, SubscriptionState,
};
use std::sync::Arc;

fn test_mux() -> (Arc<MemoryConnector>, Arc<RelayPool>, Multiplexer) {
    let connector = Arc::new(MemoryConnector::new());
    let pool = Arc::new(RelayPool::new(connector.clone()));
    let mux = Multiplexer::new(pool.clone());
    (connector, pool, mux)
}

// --- Precondition Errors ---

#[test]
fn test_open_without_query() {
    let (connector, pool, mux) = test_mux();
    let sub = mux.subscribe(SubscriptionConfig::new(["wss://a"])).unwrap();

    let result = sub.open();
    assert!(matches!(result, Err(MuxError::NoQuery(ref id)) if id.as_str() == "0"));

    // Nothing leaked onto the relay
    assert!(connector.relay("wss://a").unwrap().sent().is_empty());
    assert_eq!(pool.claim_count(&RelayUrl::new("wss://a")), 0);

    // Recoverable by setting a query first
    sub.set_query(Filter::new().kinds([1]));
    sub.open().unwrap();
    assert_eq!(sub.state(), SubscriptionState::Open);
}

#[test]
fn test_open_after_close_is_rejected() {
    let (connector, pool, mux) = test_mux();
    let sub = mux
        .subscribe(SubscriptionConfig::new(["wss://a"]).with_query(Filter::new().kinds([1])))
        .unwrap();

    sub.open().unwrap();
    sub.close();
    connector.relay("wss://a").unwrap().take_sent();

    assert!(matches!(sub.open(), Err(MuxError::Closed(_))));
    assert!(connector.relay("wss://a").unwrap().sent().is_empty());
    assert_eq!(pool.claim_count(&RelayUrl::new("wss://a")), 0);
    assert!(sub.bound_relays().is_empty());
}

#[test]
fn test_close_is_noop_unless_open() {
    let (connector, _pool, mux) = test_mux();
    let sub = mux
        .subscribe(SubscriptionConfig::new(["wss://a"]).with_query(Filter::new().kinds([1])))
        .unwrap();

    sub.close();
    assert_eq!(sub.state(), SubscriptionState::Init);
    assert!(connector.relay("wss://a").unwrap().sent().is_empty());

    sub.open().unwrap();
    sub.close();
    sub.close();
    let closes = connector
        .relay("wss://a")
        .unwrap()
        .sent()
        .iter()
        .filter(|m| m.verb() == "CLOSE")
        .count();
    assert_eq!(closes, 1);
}

#[test]
fn test_duplicate_name_rejected() {
    let (_, _, mux) = test_mux();
    let _feed = mux
        .subscribe(SubscriptionConfig::new(["wss://a"]).with_name("feed"))
        .unwrap();

    let result = mux.subscribe(SubscriptionConfig::new(["wss://b"]).with_name("feed"));
    assert!(matches!(
        result,
        Err(MuxError::DuplicateSubscription(ref id)) if *id == SubscriptionId::from("feed")
    ));
}

// --- Relay Irregularities ---

#[test]
fn test_disconnected_relay_still_receives_req() {
    let (connector, pool, mux) = test_mux();
    let relay = pool.resolve(&RelayUrl::new("wss://a"));
    connector.relay("wss://a").unwrap().set_connected(false);
    assert!(!relay.is_connected());

    let sub = mux
        .subscribe(SubscriptionConfig::new(["wss://a"]).with_query(Filter::new().kinds([1])))
        .unwrap();
    sub.open().unwrap();

    assert_eq!(connector.relay("wss://a").unwrap().sent().len(), 1);
    // Claiming reconnects the relay
    assert!(relay.is_connected());
}

#[test]
fn test_empty_relay_set() {
    let (_, _, mux) = test_mux();
    let sub = mux
        .subscribe(
            SubscriptionConfig::new(Vec::<String>::new()).with_query(Filter::new().kinds([1])),
        )
        .unwrap();

    sub.open().unwrap();
    assert!(sub.bound_relays().is_empty());

    sub.set_relays(["wss://a"]);
    assert_eq!(sub.bound_relays(), vec![RelayUrl::new("wss://a")]);

    sub.set_relays(Vec::<String>::new());
    assert!(sub.bound_relays().is_empty());
    assert!(sub.is_open());
}

#[test]
fn test_malformed_frames_are_errors() {
    let (connector, _pool, mux) = test_mux();
    let _sub = mux.subscribe(SubscriptionConfig::new(["wss://a"])).unwrap();
    let relay = connector.relay("wss://a").unwrap();

    assert!(matches!(
        relay.receive_json(r#"["EVENT","0",{"id":1}]"#),
        Err(MuxError::Deserialization(_))
    ));
    assert!(matches!(
        relay.receive_json(r#"["EVENT"]"#),
        Err(MuxError::InvalidMessage(_))
    ));
    assert!(matches!(
        RelayMessage::from_json(r#"[1,"x"]"#),
        Err(MuxError::InvalidMessage(_))
    ));
}

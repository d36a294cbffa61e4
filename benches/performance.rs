//! Performance benchmarks for subscription routing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use relaymux::{
    Event, Filter, MemoryConnector, MemoryRelay, Multiplexer, RelayPool, Subscription,
    SubscriptionConfig,
};
use std::sync::Arc;

fn setup(relay_count: usize) -> (Arc<MemoryConnector>, Multiplexer, Vec<String>) {
    let connector = Arc::new(MemoryConnector::new());
    let pool = Arc::new(RelayPool::new(connector.clone()));
    let urls = (0..relay_count).map(|i| format!("wss://relay-{}", i)).collect();
    (connector, Multiplexer::new(pool), urls)
}

fn open_subscription(mux: &Multiplexer, urls: &[String]) -> Subscription {
    let sub = mux
        .subscribe(
            SubscriptionConfig::new(urls.iter().cloned()).with_query(Filter::new().kinds([1])),
        )
        .unwrap();
    sub.open().unwrap();
    sub
}

fn event(i: usize) -> Event {
    Event {
        id: format!("{:064x}", i).as_str().into(),
        pubkey: "ab".to_string(),
        created_at: 1,
        kind: 1,
        tags: vec![],
        content: String::new(),
        sig: String::new(),
    }
}

/// Benchmark fresh events arriving on one relay
fn bench_route_unique(c: &mut Criterion) {
    let (connector, mux, urls) = setup(1);
    let sub = open_subscription(&mux, &urls);
    let relay = connector.relay(urls[0].as_str()).unwrap();
    let events: Vec<Event> = (0..10_000).map(event).collect();

    c.bench_function("route_unique_10k", |b| {
        b.iter(|| {
            sub.forget_events();
            for e in &events {
                relay.deliver("0", e.clone());
            }
            black_box(sub.seen_count());
        });
    });
}

/// Benchmark the same events arriving from several relays (dedup path)
fn bench_route_fanout_duplicates(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_fanout_duplicates");

    for relay_count in [2, 5, 10] {
        group.bench_with_input(
            BenchmarkId::new("relays", relay_count),
            &relay_count,
            |b, &count| {
                let (connector, mux, urls) = setup(count);
                let sub = open_subscription(&mux, &urls);
                let relays: Vec<Arc<MemoryRelay>> = urls
                    .iter()
                    .map(|url| connector.relay(url.as_str()).unwrap())
                    .collect();
                let events: Vec<Event> = (0..1_000).map(event).collect();

                b.iter(|| {
                    sub.forget_events();
                    for relay in &relays {
                        for e in &events {
                            relay.deliver("0", e.clone());
                        }
                    }
                    black_box(sub.seen_count());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark traffic for other subscriptions sharing a connection
fn bench_route_foreign_traffic(c: &mut Criterion) {
    let (connector, mux, urls) = setup(1);
    let _subs: Vec<Subscription> = (0..50).map(|_| open_subscription(&mux, &urls)).collect();
    let relay = connector.relay(urls[0].as_str()).unwrap();
    let e = event(1);

    c.bench_function("route_foreign_50_subs", |b| {
        b.iter(|| {
            relay.deliver("not-ours", black_box(e.clone()));
        });
    });
}

/// Benchmark relay set reconfiguration
fn bench_set_relays(c: &mut Criterion) {
    let (_connector, mux, urls) = setup(20);
    let sub = open_subscription(&mux, &urls[..10]);
    let left = urls[..10].to_vec();
    let right = urls[5..15].to_vec();

    c.bench_function("set_relays_overlap_10", |b| {
        let mut flip = false;
        b.iter(|| {
            flip = !flip;
            let target = if flip { &right } else { &left };
            sub.set_relays(target.iter().cloned());
        });
    });
}

criterion_group!(
    benches,
    bench_route_unique,
    bench_route_fanout_duplicates,
    bench_route_foreign_traffic,
    bench_set_relays,
);

criterion_main!(benches);

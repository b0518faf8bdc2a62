//! Performance benchmarks for replaybus
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use replaybus::{BusEvent, DataEvent, EventBus, LockStrategy, SafeList};
use std::sync::Arc;

fn bench_dispatch(c: &mut Criterion) {
    let event: Arc<dyn BusEvent> = Arc::new(DataEvent::tagged("bench", 1u64));

    let bus = EventBus::new();
    let _token = bus.on("bench").next(|_| {});
    c.bench_function("dispatch inline, 1 subscriber", |b| {
        b.iter(|| bus.dispatch(event.clone(), None, None));
    });

    let fanout = EventBus::new();
    for _ in 0..16 {
        fanout.on("bench").next(|_| {});
    }
    c.bench_function("dispatch inline, 16 subscribers", |b| {
        b.iter(|| fanout.dispatch(event.clone(), None, None));
    });

    let named: Arc<dyn BusEvent> = Arc::new(DataEvent::named("bench", "tick", 1u64));
    let by_name = EventBus::new();
    let _name_token = by_name.on_any().with_key("tick").next(|_| {});
    c.bench_function("dispatch inline, named, 1 subscriber", |b| {
        b.iter(|| by_name.dispatch(named.clone(), None, None));
    });
}

fn bench_register_dispose(c: &mut Criterion) {
    let bus = EventBus::new();
    c.bench_function("register + dispose", |b| {
        b.iter(|| {
            let token = bus.on("bench").next(|_| {}).unwrap();
            token.dispose();
        });
    });
}

fn bench_lock_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("SafeList append");
    for strategy in [
        LockStrategy::BarrierQueue,
        LockStrategy::OsRwLock,
        LockStrategy::Semaphore,
        LockStrategy::SingleMutex,
    ] {
        group.bench_function(format!("{strategy:?}"), |b| {
            let list = SafeList::with_strategy(strategy, "bench");
            b.iter(|| list.append(1u64));
        });
    }
    group.finish();

    let mut reads = c.benchmark_group("SafeList count");
    for strategy in [
        LockStrategy::BarrierQueue,
        LockStrategy::OsRwLock,
        LockStrategy::Semaphore,
        LockStrategy::SingleMutex,
    ] {
        reads.bench_function(format!("{strategy:?}"), |b| {
            let list = SafeList::with_strategy(strategy, "bench");
            list.append_all(0..1024u64);
            b.iter(|| list.count());
        });
    }
    reads.finish();
}

criterion_group!(
    benches,
    bench_dispatch,
    bench_register_dispose,
    bench_lock_strategies
);
criterion_main!(benches);

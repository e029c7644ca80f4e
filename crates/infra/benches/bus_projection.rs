use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

use marquee_events::{CONTENT_EVENTS_TOPIC, EventBus, EventEnvelope, InMemoryEventBus};
use marquee_infra::projections::{ContentViewProjection, content_created_envelope};
use marquee_infra::read_model::{ContentViewStore, InMemoryContentViewStore};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_publish_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_publish_throughput");

    for batch_size in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let bus: Bus = Arc::new(InMemoryEventBus::new());
                let mut id = 0i64;
                b.iter(|| {
                    for _ in 0..batch_size {
                        id += 1;
                        bus.publish(
                            CONTENT_EVENTS_TOPIC,
                            content_created_envelope(id, "title", "MOVIE", Utc::now()),
                        )
                        .unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_publish_consume_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_round_trip");
    group.sample_size(500);

    group.bench_function("publish_recv_commit", |b| {
        let bus: Bus = Arc::new(InMemoryEventBus::with_partitions(1));
        let mut sub = bus.subscribe(CONTENT_EVENTS_TOPIC, "bench");
        let mut id = 0i64;
        b.iter(|| {
            id += 1;
            bus.publish(
                CONTENT_EVENTS_TOPIC,
                content_created_envelope(id, "title", "MOVIE", Utc::now()),
            )
            .unwrap();
            let d = sub.recv_timeout(Duration::from_millis(100)).unwrap();
            sub.commit(&d).unwrap();
            black_box(d.offset);
        });
    });

    group.finish();
}

fn bench_projection_apply(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("content_view_projection");

    group.bench_function("apply_fresh", |b| {
        let projection = ContentViewProjection::new(Arc::new(InMemoryContentViewStore::new()));
        let mut id = 0i64;
        b.iter(|| {
            id += 1;
            let env = content_created_envelope(id, "title", "MOVIE", Utc::now());
            black_box(rt.block_on(projection.apply_envelope(&env)).unwrap());
        });
    });

    // Redelivery of an already applied envelope.
    group.bench_function("apply_duplicate", |b| {
        let projection = ContentViewProjection::new(Arc::new(InMemoryContentViewStore::new()));
        let env = content_created_envelope(1, "title", "MOVIE", Utc::now());
        rt.block_on(projection.apply_envelope(&env)).unwrap();
        b.iter(|| black_box(rt.block_on(projection.apply_envelope(&env)).unwrap()));
    });

    for views in [100usize, 1_000].iter() {
        group.bench_with_input(BenchmarkId::new("recent_10", views), views, |b, &views| {
            let store = Arc::new(InMemoryContentViewStore::new());
            let projection = ContentViewProjection::new(store.clone());
            for id in 0..views as i64 {
                let env = content_created_envelope(id + 1, "title", "MOVIE", Utc::now());
                rt.block_on(projection.apply_envelope(&env)).unwrap();
            }
            b.iter(|| black_box(rt.block_on(store.recent(10)).unwrap().len()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_publish_throughput,
    bench_publish_consume_commit,
    bench_projection_apply
);
criterion_main!(benches);

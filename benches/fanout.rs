use std::time::Instant;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use ghostbus::{
    BroadcastHub, ClassifiedEvent, GhostPolicy, HubConfig, IngestPipeline, OverflowPolicy,
    PositionUpdate, SweepMode, VehiclePosition,
};

fn event(ts: i64) -> ClassifiedEvent {
    ClassifiedEvent::bus_update(VehiclePosition::from_update(
        &PositionUpdate::new("B1", 12.9716, 77.5946, 22.5, ts).with_route("KAR-R1"),
    ))
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fanout");
    group.throughput(Throughput::Elements(1));

    for subscribers in [1usize, 16, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &subscribers, |b, &n| {
            let hub = BroadcastHub::new(HubConfig {
                queue_capacity: 1024,
                overflow: OverflowPolicy::DropOldest,
            });
            let subs: Vec<_> = (0..n).map(|_| hub.subscribe()).collect();
            let ev = event(now());

            b.iter(|| {
                hub.publish(&ev);
                for sub in &subs {
                    let _ = sub.try_recv();
                }
            });
        });
    }

    group.finish();
}

fn bench_publish_with_stalled_subscriber(c: &mut Criterion) {
    c.bench_function("publish/stalled_subscriber", |b| {
        b.iter_custom(|iters| {
            // Fresh hub per sample; the stalled queue is full from the first publish on.
            let hub = BroadcastHub::new(HubConfig {
                queue_capacity: 1,
                overflow: OverflowPolicy::DropOldest,
            });
            let _stalled = hub.subscribe();
            let healthy = hub.subscribe();
            let ev = event(now());
            hub.publish(&ev);
            let _ = healthy.try_recv();

            let start = Instant::now();
            for _ in 0..iters {
                hub.publish(&ev);
                let _ = healthy.try_recv();
            }
            start.elapsed()
        });
    });
}

fn bench_ingest_and_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(1));

    group.bench_function("ingest", |b| {
        let pipeline = IngestPipeline::in_memory(GhostPolicy::default(), HubConfig::default());
        let _sub = pipeline.subscribe();
        let ts = now();
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let update = PositionUpdate::new(format!("B{}", i % 500), 12.9, 77.6, 18.0, ts);
            pipeline.ingest(&update).unwrap()
        });
    });

    group.bench_function("sweep_500_changed", |b| {
        let pipeline = IngestPipeline::in_memory(GhostPolicy::default(), HubConfig::default());
        let ts = now();
        for i in 0..500 {
            pipeline
                .ingest(&PositionUpdate::new(format!("B{i}"), 12.9, 77.6, 18.0, ts))
                .unwrap();
        }
        b.iter(|| pipeline.sweep(SweepMode::Changed));
    });

    group.finish();
}

criterion_group!(
    fanout,
    bench_publish_fanout,
    bench_publish_with_stalled_subscriber,
    bench_ingest_and_sweep
);
criterion_main!(fanout);

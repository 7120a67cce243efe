use std::{hint::black_box, sync::Arc, time::Duration};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;
use volna::{
    bus::{Bus, Inbox},
    envelope::Envelope,
};

/// Шина с `n` подписчиками-очередями; очереди вычитываются в фоне.
fn bus_with_inboxes(
    rt: &Runtime,
    n: usize,
) -> Arc<Bus> {
    let bus = Arc::new(Bus::new("bench"));
    for i in 0..n {
        let (inbox, mut rx) = Inbox::channel(format!("sub-{i}"), 1024, Duration::from_millis(50));
        bus.subscribe(Arc::new(inbox));
        rt.spawn(async move { while rx.recv().await.is_some() {} });
    }
    bus
}

fn bench_publish(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("bus_publish");

    for subscribers in [1usize, 10, 100] {
        let bus = bus_with_inboxes(&rt, subscribers);
        let batch = Arc::new(vec![Envelope::new("chat.message", "bench", "payload")]);
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.to_async(&rt).iter(|| {
                    let bus = Arc::clone(&bus);
                    let batch = Arc::clone(&batch);
                    async move {
                        let report = bus.publish(black_box("sender"), black_box(&batch)).await;
                        black_box(report.delivered)
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_publish);
criterion_main!(benches);

use std::{hint::black_box, sync::Arc};

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::{runtime::Runtime, sync::mpsc};
use volna::{
    broadcast::{resolver::VALUE_CHANNEL_ID, Broadcaster, StaticChannelResolver},
    bus::BusPool,
    connection::Connection,
    envelope::Envelope,
};
use volna_error::StackError;

/// Соединение, отбрасывающее всё отправленное.
struct Discard {
    id: String,
    channel: String,
}

#[async_trait]
impl Connection for Discard {
    fn id(&self) -> &str {
        &self.id
    }

    fn subscribe(
        &self,
        _listener: mpsc::Sender<Envelope>,
    ) {
    }

    async fn publish(
        &self,
        envelope: Envelope,
    ) -> Result<(), StackError> {
        black_box(envelope);
        Ok(())
    }

    fn value(
        &self,
        key: &str,
    ) -> Option<serde_json::Value> {
        (key == VALUE_CHANNEL_ID).then(|| serde_json::Value::from(self.channel.as_str()))
    }
}

/// Рассылка по связанному идентификатору, покрывающему `rooms` каналов по
/// четыре участника.
fn bench_broadcast(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("broadcast");

    for rooms in [1usize, 8, 32] {
        let resolver = StaticChannelResolver::new();
        resolver.relate("party", (0..rooms).map(|r| format!("room-{r}")));
        let broadcaster = Arc::new(Broadcaster::new(
            "bench",
            Arc::new(BusPool::default()),
            Arc::new(resolver),
        ));

        rt.block_on(async {
            for r in 0..rooms {
                for m in 0..4 {
                    let conn = Arc::new(Discard {
                        id: format!("c-{r}-{m}"),
                        channel: format!("room-{r}"),
                    });
                    broadcaster.add_connection(conn).await;
                }
            }
        });

        let messages = Arc::new(vec![Envelope::new("chat.message", "bench", "payload")]);
        group.bench_with_input(BenchmarkId::new("related", rooms), &rooms, |b, _| {
            b.to_async(&rt).iter(|| {
                let broadcaster = Arc::clone(&broadcaster);
                let messages = Arc::clone(&messages);
                async move {
                    let results = broadcaster
                        .broadcast("sender", black_box("party"), &messages)
                        .await;
                    black_box(results.len())
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_broadcast);
criterion_main!(benches);

use std::{collections::HashMap, hint::black_box, sync::Arc};

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;
use volna::{
    builtin,
    envelope::Envelope,
    producer::{Producer, ProducersPool, ProducersPoolConfig},
    registry::TypeRegistry,
};
use volna_error::StackError;

struct Discard(String);

#[async_trait]
impl Producer for Discard {
    fn id(&self) -> &str {
        &self.0
    }

    async fn produce(
        &self,
        envelope: &Envelope,
    ) -> Result<(), StackError> {
        black_box(envelope);
        Ok(())
    }
}

fn pool() -> ProducersPool {
    let registry = TypeRegistry::new();
    registry.register_pack(builtin::core_pack());

    let config = ProducersPoolConfig {
        supported_types_by_producer_id: HashMap::from([
            ("wild".to_string(), vec!["*".to_string()]),
            ("chat".to_string(), vec![builtin::CHAT_MESSAGE.to_string()]),
        ]),
        supported_packs_by_producer_id: HashMap::from([(
            "core".to_string(),
            vec![builtin::CORE_PACK.to_string()],
        )]),
    };
    let producers: Vec<Arc<dyn Producer>> = ["wild", "chat", "core"]
        .into_iter()
        .map(|id| Arc::new(Discard(id.to_string())) as Arc<dyn Producer>)
        .collect();

    ProducersPool::new("bench", &config, producers, &registry).unwrap()
}

fn bench_produce(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pool = Arc::new(pool());
    let envelope = Arc::new(Envelope::new(builtin::CHAT_MESSAGE, "bench", "payload"));

    c.bench_function("producers_pool_produce", |b| {
        b.to_async(&rt).iter(|| {
            let pool = Arc::clone(&pool);
            let envelope = Arc::clone(&envelope);
            async move { pool.produce(black_box(&envelope)).await.unwrap() }
        })
    });

    let batch: Arc<Vec<Envelope>> = Arc::new(
        (0..32)
            .map(|i| {
                let payload_type = if i % 2 == 0 {
                    builtin::CHAT_MESSAGE
                } else {
                    builtin::PING
                };
                Envelope::new(payload_type, "bench", i)
            })
            .collect(),
    );
    c.bench_function("producers_pool_produce_batch_32", |b| {
        b.to_async(&rt).iter(|| {
            let pool = Arc::clone(&pool);
            let batch = Arc::clone(&batch);
            async move { pool.produce_batch(black_box(&batch)).await.unwrap() }
        })
    });
}

criterion_group!(benches, bench_produce);
criterion_main!(benches);

//! Продюсеры: пул по типам и пакам, пересылка по правилам и эмиттер
//! роутера.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use volna::{
    builtin::{self, ChatMessage, Ping, CHAT_MESSAGE, PING},
    connection::{Connection, MemoryConnection},
    envelope::Envelope,
    producer::{DefaultEmitter, Forwarder, Producer, ProducerRule, ProducersPool, ProducersPoolConfig},
    registry::TypeRegistry,
    router::{handler_fn, Router},
    StackError, StatusCode,
};

#[derive(Default)]
struct Recorder {
    id: String,
    seen: Mutex<Vec<String>>,
}

impl Recorder {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Producer for Recorder {
    fn id(&self) -> &str {
        &self.id
    }

    async fn produce(
        &self,
        envelope: &Envelope,
    ) -> Result<(), StackError> {
        self.seen.lock().push(envelope.payload_type.clone());
        Ok(())
    }
}

fn core_registry() -> TypeRegistry {
    let registry = TypeRegistry::new();
    registry.register_pack(builtin::core_pack());
    registry
}

fn chat(text: &str) -> Envelope {
    Envelope::new(
        CHAT_MESSAGE,
        "a",
        ChatMessage {
            room: "lobby".into(),
            text: text.into(),
        },
    )
}

/// Тест проверяет раскладку продюсеров по пакам, типам и fallback.
#[tokio::test]
async fn test_pool_routes_by_pack_type_and_fallback() {
    let audit = Recorder::new("audit");
    let chat_sink = Recorder::new("chat");
    let fallback = Recorder::new("fallback");

    let config = ProducersPoolConfig {
        supported_types_by_producer_id: HashMap::from([
            ("chat".to_string(), vec![CHAT_MESSAGE.to_string()]),
            ("fallback".to_string(), vec!["!".to_string()]),
        ]),
        supported_packs_by_producer_id: HashMap::from([(
            "audit".to_string(),
            vec![builtin::CORE_PACK.to_string()],
        )]),
    };
    let producers: Vec<Arc<dyn Producer>> =
        vec![audit.clone(), chat_sink.clone(), fallback.clone()];
    let pool = ProducersPool::new("default", &config, producers, &core_registry()).unwrap();

    pool.produce(&chat("hi")).await.unwrap();
    pool.produce(&Envelope::new(PING, "a", Ping::default()))
        .await
        .unwrap();
    pool.produce(&Envelope::new("metrics.tick", "a", 1u8))
        .await
        .unwrap();

    assert_eq!(audit.seen(), vec![CHAT_MESSAGE, PING]);
    assert_eq!(chat_sink.seen(), vec![CHAT_MESSAGE]);
    assert_eq!(fallback.seen(), vec!["metrics.tick"]);
}

/// Тест проверяет, что пак, неизвестный реестру, прерывает построение.
#[tokio::test]
async fn test_pool_rejects_unknown_pack() {
    let config = ProducersPoolConfig {
        supported_packs_by_producer_id: HashMap::from([(
            "audit".to_string(),
            vec!["billing".to_string()],
        )]),
        ..Default::default()
    };
    let producers: Vec<Arc<dyn Producer>> = vec![Recorder::new("audit")];

    let err = ProducersPool::new("default", &config, producers, &core_registry())
        .err()
        .unwrap();
    assert!(err.is(StatusCode::UnknownPack));
}

/// Тест проверяет пересылку: wildcard и конкретное правило вместе,
/// отказ от пакета со смешанными типами.
#[tokio::test]
async fn test_forwarder_rules() {
    let everything = Recorder::new("everything");
    let chats = Recorder::new("chats");
    let forwarder = Forwarder::builder()
        .rule("*", Arc::new(ProducerRule(everything.clone())))
        .rule(CHAT_MESSAGE, Arc::new(ProducerRule(chats.clone())))
        .build("forwarder");

    forwarder
        .produce_batch(&[chat("one"), chat("two")])
        .await
        .unwrap();
    forwarder
        .produce(&Envelope::new(PING, "a", Ping::default()))
        .await
        .unwrap();

    assert_eq!(everything.seen(), vec![CHAT_MESSAGE, CHAT_MESSAGE, PING]);
    assert_eq!(chats.seen(), vec![CHAT_MESSAGE, CHAT_MESSAGE]);

    let err = forwarder
        .produce_batch(&[chat("x"), Envelope::new(PING, "a", Ping::default())])
        .await
        .unwrap_err();
    assert!(err.is(StatusCode::MixedBatch));
}

/// Тест проверяет, что конверты из `ctx.emit` доходят до продюсеров по
/// умолчанию уже после ответа клиенту.
#[tokio::test]
async fn test_router_emits_to_default_producers() {
    let sink = Recorder::new("sink");
    let router = Router::builder("server")
        .emitter(DefaultEmitter::default().with(sink.clone()))
        .build();
    router.register(
        "audit.me",
        vec![handler_fn("emit", |ctx| {
            let copy = Envelope::new("audit.record", ctx.responder_id(), 1u8);
            ctx.emit(copy);
        })],
    );

    let conn: Arc<dyn Connection> = Arc::new(MemoryConnection::new("c1"));
    let out = router
        .route(&conn, Envelope::new("audit.me", "c1", 0u8))
        .await;
    assert_eq!(out.len(), 1);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while sink.seen().is_empty() {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(sink.seen(), vec!["audit.record"]);
}

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tracing::{debug, error, info, trace, warn};
use volna_error::{join_errors, LogLevel, RoutingError, StackError};

use super::{
    context::RequestParts, AckGenerator, DefaultAckGenerator, Handler, RequestContext,
};
use crate::{
    broadcast::{BroadcastContext, ContextSink},
    connection::Connection,
    envelope::{Envelope, HEADER_CONNECTION_ID, NO_MATCH_PAYLOAD_TYPE},
    producer::DefaultEmitter,
};

type Chain = Arc<[Arc<dyn Handler>]>;

/// Роутер входящих сообщений.
pub struct Router {
    id: String,
    handlers: RwLock<HashMap<String, Chain>>,
    ack: Arc<dyn AckGenerator>,
    broadcasters: Vec<Arc<dyn ContextSink>>,
    notifiers: Vec<Arc<dyn ContextSink>>,
    emitter: DefaultEmitter,
}

pub struct RouterBuilder {
    id: String,
    ack: Option<Arc<dyn AckGenerator>>,
    broadcasters: Vec<Arc<dyn ContextSink>>,
    notifiers: Vec<Arc<dyn ContextSink>>,
    emitter: DefaultEmitter,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl RouterBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ack: None,
            broadcasters: Vec::new(),
            notifiers: Vec::new(),
            emitter: DefaultEmitter::default(),
        }
    }

    /// Генератор подтверждений. По умолчанию [`DefaultAckGenerator`].
    pub fn ack(
        mut self,
        ack: Arc<dyn AckGenerator>,
    ) -> Self {
        self.ack = Some(ack);
        self
    }

    /// Получатель broadcast-контекста.
    pub fn broadcaster(
        mut self,
        sink: Arc<dyn ContextSink>,
    ) -> Self {
        self.broadcasters.push(sink);
        self
    }

    /// Получатель notify-контекста.
    pub fn notifier(
        mut self,
        sink: Arc<dyn ContextSink>,
    ) -> Self {
        self.notifiers.push(sink);
        self
    }

    pub fn emitter(
        mut self,
        emitter: DefaultEmitter,
    ) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn build(self) -> Router {
        let ack = self
            .ack
            .unwrap_or_else(|| Arc::new(DefaultAckGenerator::new(self.id.clone())));
        Router {
            id: self.id,
            handlers: RwLock::new(HashMap::new()),
            ack,
            broadcasters: self.broadcasters,
            notifiers: self.notifiers,
            emitter: self.emitter,
        }
    }
}

impl Router {
    pub fn builder(id: impl Into<String>) -> RouterBuilder {
        RouterBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Регистрирует цепочку обработчиков, заменяя прежнюю.
    pub fn register(
        &self,
        payload_type: impl Into<String>,
        handlers: Vec<Arc<dyn Handler>>,
    ) {
        let payload_type = payload_type.into();
        let replaced = self
            .handlers
            .write()
            .insert(payload_type.clone(), handlers.into())
            .is_some();
        if replaced {
            debug!(payload_type = %payload_type, "Handler chain replaced");
        } else {
            debug!(payload_type = %payload_type, "Handler chain registered");
        }
    }

    pub fn unregister(
        &self,
        payload_type: &str,
    ) -> bool {
        self.handlers.write().remove(payload_type).is_some()
    }

    pub fn is_registered(
        &self,
        payload_type: &str,
    ) -> bool {
        self.handlers.read().contains_key(payload_type)
    }

    /// Цепочка для типа, иначе fallback-цепочка.
    fn chain_for(
        &self,
        payload_type: &str,
    ) -> Result<Chain, RoutingError> {
        let handlers = self.handlers.read();
        handlers
            .get(payload_type)
            .or_else(|| handlers.get(NO_MATCH_PAYLOAD_TYPE))
            .cloned()
            .ok_or_else(|| RoutingError::NoHandlerRegistered {
                payload_type: payload_type.to_string(),
            })
    }

    async fn run_chain(
        &self,
        request: Envelope,
        connection: Option<Arc<dyn Connection>>,
    ) -> RequestContext {
        let validation = request.validate();
        let chain = self.chain_for(&request.payload_type);
        let mut ctx = RequestContext::new(self.id.clone(), request, connection);

        if let Err(e) = validation {
            ctx.set_error(e);
            return ctx;
        }

        match chain {
            Ok(chain) => {
                for handler in chain.iter() {
                    handler.handle(&mut ctx).await;
                }
            }
            Err(e) => ctx.set_error(e),
        }
        ctx
    }

    /// Прямая обработка без соединения: ни подтверждения, ни рассылок.
    pub async fn handle(
        &self,
        envelope: Envelope,
    ) -> Result<(), StackError> {
        let ctx = self.run_chain(envelope, None).await;
        match ctx.error() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Обрабатывает сообщение соединения и возвращает ответы для него.
    ///
    /// Первым всегда идёт подтверждение. При ошибке оно единственное и
    /// несёт ошибку; при успехе собранные рассылки и исходящие конверты
    /// отправляются в фоне.
    pub async fn route(
        &self,
        connection: &Arc<dyn Connection>,
        mut envelope: Envelope,
    ) -> Vec<Envelope> {
        envelope.set_header(HEADER_CONNECTION_ID, connection.id());
        trace!(
            connection = %connection.id(),
            message_id = %envelope.id,
            payload_type = %envelope.payload_type,
            "Message received"
        );

        let ctx = self
            .run_chain(envelope, Some(Arc::clone(connection)))
            .await;
        let RequestParts {
            request,
            responses,
            error,
            broadcast,
            notify,
            emitted,
        } = ctx.into_parts();

        if let Some(error) = error {
            log_error(&request, &error);
            return vec![self.ack.ack(&request, Some(&error))];
        }

        let mut out = Vec::with_capacity(responses.len() + 1);
        out.push(self.ack.ack(&request, None));
        out.extend(responses);

        self.spawn_fanout(connection.id(), broadcast, notify, emitted);
        out
    }

    /// Обрабатывает сообщение и отправляет ответы в соединение.
    pub async fn listen(
        &self,
        connection: &Arc<dyn Connection>,
        envelope: Envelope,
    ) -> Result<(), StackError> {
        let responses = self.route(connection, envelope).await;
        let mut errors = Vec::new();
        for response in responses {
            if let Err(e) = connection.publish(response).await {
                warn!(connection = %connection.id(), error = %e, "Response not delivered");
                errors.push(e);
            }
        }
        join_errors(errors)
    }

    /// Отправляет подтверждение с ошибкой, когда обработка прервалась до
    /// ответа.
    pub async fn acknowledge_failure(
        &self,
        connection: &Arc<dyn Connection>,
        request: &Envelope,
        error: StackError,
    ) -> Result<(), StackError> {
        connection
            .publish(self.ack.ack(request, Some(&error)))
            .await
    }

    fn spawn_fanout(
        &self,
        from_id: &str,
        broadcast: BroadcastContext,
        notify: BroadcastContext,
        emitted: Vec<Envelope>,
    ) {
        if !broadcast.is_empty() {
            spawn_sinks(&self.broadcasters, from_id, broadcast);
        }
        if !notify.is_empty() {
            spawn_sinks(&self.notifiers, from_id, notify);
        }
        if !emitted.is_empty() {
            if self.emitter.is_empty() {
                warn!(count = emitted.len(), "No default producers, emitted envelopes dropped");
                return;
            }
            let emitter = self.emitter.clone();
            tokio::spawn(async move {
                if let Err(e) = emitter.emit(&emitted).await {
                    warn!(error = %e, "Emit failed");
                }
            });
        }
    }
}

fn spawn_sinks(
    sinks: &[Arc<dyn ContextSink>],
    from_id: &str,
    ctx: BroadcastContext,
) {
    if sinks.is_empty() {
        debug!(channels = ctx.len(), "No sinks configured, context dropped");
        return;
    }
    for sink in sinks {
        let sink = Arc::clone(sink);
        let from_id = from_id.to_string();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            sink.dispatch(&from_id, ctx).await;
        });
    }
}

fn log_error(
    request: &Envelope,
    error: &StackError,
) {
    let tags = error.root().log_tags();
    match error.log_level() {
        LogLevel::Error => error!(
            message_id = %request.id,
            payload_type = %request.payload_type,
            error = %error,
            ?tags,
            "Request failed"
        ),
        LogLevel::Warn => warn!(
            message_id = %request.id,
            payload_type = %request.payload_type,
            error = %error,
            ?tags,
            "Request failed"
        ),
        LogLevel::Info => info!(
            message_id = %request.id,
            payload_type = %request.payload_type,
            error = %error,
            ?tags,
            "Request failed"
        ),
        LogLevel::Debug | LogLevel::Trace => debug!(
            message_id = %request.id,
            payload_type = %request.payload_type,
            error = %error,
            ?tags,
            "Request failed"
        ),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use volna_error::{GenericError, StatusCode};

    use super::*;
    use crate::{
        connection::MemoryConnection,
        router::{handler_fn, AckPayload, ACK_PAYLOAD_TYPE},
    };

    fn conn(id: &str) -> (Arc<MemoryConnection>, Arc<dyn Connection>) {
        let memory = Arc::new(MemoryConnection::new(id));
        let dynamic: Arc<dyn Connection> = memory.clone();
        (memory, dynamic)
    }

    fn ok_flag(ack: &Envelope) -> bool {
        ack.payload_as::<AckPayload>().unwrap().ok
    }

    /// Тест проверяет, что повторная регистрация заменяет цепочку.
    #[tokio::test]
    async fn test_register_replaces_chain() {
        let router = Router::builder("router").build();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let c = calls.clone();
        router.register("t", vec![handler_fn("h1", move |_| c.lock().push("h1"))]);
        let c = calls.clone();
        router.register("t", vec![handler_fn("h2", move |_| c.lock().push("h2"))]);

        router.handle(Envelope::new("t", "a", 1u8)).await.unwrap();
        assert_eq!(*calls.lock(), vec!["h2"]);
    }

    /// Тест проверяет: ошибка обработчика даёт единственный ответ:
    /// подтверждение с ошибкой; остальные обработчики выполняются.
    #[tokio::test]
    async fn test_handler_error_yields_ack_only() {
        let router = Router::builder("router").build();
        let ran = Arc::new(Mutex::new(0));
        let r = ran.clone();
        router.register(
            "t",
            vec![
                handler_fn("fail", |ctx| {
                    ctx.set_error(GenericError::new(StatusCode::HandlerFailed, "nope"));
                    ctx.reply("t.reply", 1u8);
                    ctx.broadcast_mut()
                        .add("room", "room-1", Envelope::new("t", "a", 1u8));
                }),
                handler_fn("after", move |_| *r.lock() += 1),
            ],
        );

        let (_, c) = conn("c1");
        let responses = router.route(&c, Envelope::new("t", "c1", 1u8)).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].payload_type, ACK_PAYLOAD_TYPE);
        assert!(!ok_flag(&responses[0]));
        assert!(responses[0]
            .error
            .as_ref()
            .unwrap()
            .is(StatusCode::HandlerFailed));
        assert_eq!(*ran.lock(), 1);
    }

    /// Тест проверяет успешный путь: подтверждение первым, затем ответы.
    #[tokio::test]
    async fn test_success_ack_then_responses() {
        let router = Router::builder("router").build();
        router.register("ping", vec![handler_fn("pong", |ctx| ctx.reply("pong", 1u8))]);

        let (memory, c) = conn("c1");
        router.listen(&c, Envelope::new("ping", "c1", 1u8)).await.unwrap();

        let out = memory.take_published();
        assert_eq!(out.len(), 2);
        assert!(ok_flag(&out[0]));
        assert_eq!(out[1].payload_type, "pong");
    }

    #[tokio::test]
    async fn test_unknown_type_and_fallback() {
        let router = Router::builder("router").build();
        let err = router.handle(Envelope::new("x", "a", 1u8)).await.unwrap_err();
        assert!(err.is(StatusCode::NoHandlerRegistered));

        router.register(NO_MATCH_PAYLOAD_TYPE, vec![handler_fn("any", |_| {})]);
        assert!(router.handle(Envelope::new("x", "a", 1u8)).await.is_ok());
        assert!(router.unregister(NO_MATCH_PAYLOAD_TYPE));
        assert!(!router.is_registered(NO_MATCH_PAYLOAD_TYPE));
    }

    /// Тест проверяет, что невалидный запрос не доходит до обработчиков.
    #[tokio::test]
    async fn test_invalid_request_rejected() {
        let router = Router::builder("router").build();
        let ran = Arc::new(Mutex::new(false));
        let r = ran.clone();
        router.register("t", vec![handler_fn("h", move |_| *r.lock() = true)]);

        let mut request = Envelope::new("t", "c1", 1u8);
        request.from_sender_id.clear();
        let (_, c) = conn("c1");
        let responses = router.route(&c, request).await;
        assert!(responses[0]
            .error
            .as_ref()
            .unwrap()
            .is(StatusCode::ValidationFailed));
        assert!(!*ran.lock());
    }

    struct CodeAck(Mutex<Vec<Option<StatusCode>>>);

    impl AckGenerator for CodeAck {
        fn ack(
            &self,
            request: &Envelope,
            error: Option<&StackError>,
        ) -> Envelope {
            let code = error.map(|e| e.status_code());
            self.0.lock().push(code);
            Envelope::new(ACK_PAYLOAD_TYPE, "router", code.map_or(0, |c| c.code()))
                .with_to([request.from_sender_id.clone()])
        }
    }

    /// Тест проверяет, что генератор подтверждений получает ошибку
    /// обработки и сам решает, как её отразить.
    #[tokio::test]
    async fn test_ack_generator_receives_error() {
        let generator = Arc::new(CodeAck(Mutex::new(Vec::new())));
        let router = Router::builder("router").ack(generator.clone()).build();
        router.register("ping", vec![handler_fn("pong", |ctx| ctx.reply("pong", 1u8))]);

        let (_, c) = conn("c1");
        let ok = router.route(&c, Envelope::new("ping", "c1", 1u8)).await;
        let failed = router.route(&c, Envelope::new("nope", "c1", 1u8)).await;
        router
            .acknowledge_failure(
                &c,
                &Envelope::new("ping", "c1", 1u8),
                GenericError::new(StatusCode::PanicRecovered, "gone").into(),
            )
            .await
            .unwrap();

        assert_eq!(ok[0].payload_as::<u32>(), Some(&0));
        assert_eq!(failed.len(), 1);
        assert_eq!(
            failed[0].payload_as::<u32>(),
            Some(&StatusCode::NoHandlerRegistered.code())
        );
        assert_eq!(
            *generator.0.lock(),
            vec![
                None,
                Some(StatusCode::NoHandlerRegistered),
                Some(StatusCode::PanicRecovered)
            ]
        );
    }

    struct CapturingSink(Mutex<Vec<(String, usize)>>);

    #[async_trait]
    impl ContextSink for CapturingSink {
        async fn dispatch(
            &self,
            from_id: &str,
            ctx: BroadcastContext,
        ) {
            self.0.lock().push((from_id.to_string(), ctx.len()));
        }
    }

    /// Тест проверяет, что рассылки уходят в фоне с id соединения.
    #[tokio::test]
    async fn test_broadcast_dispatched_with_connection_id() {
        let sink = Arc::new(CapturingSink(Mutex::new(Vec::new())));
        let notify = Arc::new(CapturingSink(Mutex::new(Vec::new())));
        let router = Router::builder("router")
            .broadcaster(sink.clone())
            .notifier(notify.clone())
            .build();
        router.register(
            "chat",
            vec![handler_fn("fan", |ctx| {
                let msg = Envelope::new("chat", "c1", 1u8);
                ctx.broadcast_mut().add("room", "room-1", msg);
            })],
        );

        let (_, c) = conn("c1");
        router.route(&c, Envelope::new("chat", "c1", 1u8)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*sink.0.lock(), vec![("c1".to_string(), 1)]);
        assert!(notify.0.lock().is_empty());
    }
}

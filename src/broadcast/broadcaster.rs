use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, error, warn};
use uuid::Uuid;
use volna_error::{join_errors, DeliveryError, RoutingError, StackError};

use super::{
    BroadcastContext, ChannelInfoResolver, ContextSink, Finalizer, Source, SourceTable,
};
use crate::{
    bus::BusPool,
    connection::{Connection, ConnectionEvent, ConnectionSubscriber},
    envelope::{Envelope, HEADER_BROADCAST_ID, HEADER_BROADCAST_TO},
    producer::Producer,
};

/// Каналы, уже получившие сообщения в рамках одного вызова.
///
/// Ключи без учёта регистра.
#[derive(Debug, Default, Clone)]
pub struct Published(HashSet<String>);

impl Published {
    /// `true`, если канал ещё не получал сообщений.
    pub fn insert(
        &mut self,
        channel_id: &str,
    ) -> bool {
        self.0.insert(channel_id.to_ascii_lowercase())
    }

    pub fn contains(
        &self,
        channel_id: &str,
    ) -> bool {
        self.0.contains(&channel_id.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Итог рассылки в один канал.
#[derive(Debug, Clone)]
pub struct BroadcastResult {
    pub channel_id: String,
    pub delivered: usize,
    pub error: Option<StackError>,
}

/// Движок рассылки.
pub struct Broadcaster {
    id: String,
    pool: Arc<BusPool>,
    sources: SourceTable,
    resolver: Arc<dyn ChannelInfoResolver>,
    finalizer: Option<Arc<dyn Finalizer>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Broadcaster {
    pub fn new(
        id: impl Into<String>,
        pool: Arc<BusPool>,
        resolver: Arc<dyn ChannelInfoResolver>,
    ) -> Self {
        Self {
            id: id.into(),
            pool,
            sources: SourceTable::new(),
            resolver,
            finalizer: None,
        }
    }

    /// Финализатор для каналов контекста с `use_finalizer`.
    pub fn with_finalizer(
        mut self,
        finalizer: Arc<dyn Finalizer>,
    ) -> Self {
        self.finalizer = Some(finalizer);
        self
    }

    pub fn sources(&self) -> &SourceTable {
        &self.sources
    }

    pub fn pool(&self) -> &Arc<BusPool> {
        &self.pool
    }

    /// Регистрирует соединение как источник его канала.
    ///
    /// Соединение без канала или с недоступным резолвером не
    /// регистрируется.
    pub async fn add_connection(
        &self,
        connection: Arc<dyn Connection>,
    ) -> bool {
        match self.resolver.connection_channel(connection.as_ref()).await {
            Ok(Some(info)) => {
                debug!(
                    connection = %connection.id(),
                    channel = %info.channel_id,
                    related = info.related.len(),
                    "Source registered"
                );
                let replaced = self
                    .sources
                    .insert(Source::new(connection, info.channel_id, info.related));
                if let Some(old) = replaced {
                    self.release(&old);
                }
                true
            }
            Ok(None) => {
                debug!(connection = %connection.id(), "Connection has no channel, not registered");
                false
            }
            Err(e) => {
                let err = DeliveryError::ChannelInfo {
                    identifier: connection.id().to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Source not registered");
                false
            }
        }
    }

    /// Снимает источник и отписывает его от шины канала.
    pub fn remove_connection(
        &self,
        connection_id: &str,
    ) -> bool {
        match self.sources.remove(connection_id) {
            Some(source) => {
                self.release(&source);
                debug!(connection = %connection_id, "Source removed");
                true
            }
            None => false,
        }
    }

    fn release(
        &self,
        source: &Source,
    ) {
        if let Some(subscription_id) = &source.subscription_id {
            self.pool
                .unsubscribe(&source.channel_key(), subscription_id);
        }
    }

    pub async fn on_event(
        &self,
        event: ConnectionEvent,
    ) {
        if event.added {
            self.add_connection(event.connection).await;
        } else {
            self.remove_connection(event.connection.id());
        }
    }

    /// Слушает события соединений, пока канал событий открыт.
    pub fn watch(
        self: Arc<Self>,
        mut events: broadcast::Receiver<ConnectionEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.on_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Broadcaster lagged behind connection events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(broadcaster = %self.id, "Connection watcher stopped");
        })
    }

    /// Подписывает источник на шину его канала, если он ещё не подписан.
    fn ensure_subscribed(
        &self,
        source: &Source,
    ) {
        if source.subscription_id.is_some() {
            return;
        }
        let subscriber = Arc::new(ConnectionSubscriber::new(Arc::clone(&source.connection)));
        let (_, subscription_id) = self
            .pool
            .get_and_subscribe(&source.channel_key(), subscriber);
        if !self
            .sources
            .mark_subscribed(source.connection_id(), subscription_id.clone())
        {
            // источник удалён, пока шла подписка
            self.pool
                .unsubscribe(&source.channel_key(), &subscription_id);
        }
    }

    async fn publish_channel(
        &self,
        from_id: &str,
        channel_id: &str,
        messages: &[Envelope],
        published: &mut Published,
    ) -> Option<BroadcastResult> {
        if !published.insert(channel_id) {
            return None;
        }
        let bus = self.pool.get(&channel_id.to_ascii_lowercase());
        let report = bus.publish(from_id, messages).await;
        let delivered = report.delivered;
        Some(BroadcastResult {
            channel_id: channel_id.to_string(),
            delivered,
            error: report.into_result().err(),
        })
    }

    /// Подписывает все источники, затем публикует по разу в каждый их канал.
    async fn deliver_to_sources(
        &self,
        from_id: &str,
        sources: &[Source],
        messages: &[Envelope],
        published: &mut Published,
        results: &mut Vec<BroadcastResult>,
    ) {
        for source in sources {
            self.ensure_subscribed(source);
        }

        let mut channels: Vec<&str> = Vec::new();
        for source in sources {
            if !channels
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&source.channel_id))
            {
                channels.push(&source.channel_id);
            }
        }

        for channel in channels {
            if let Some(result) = self
                .publish_channel(from_id, channel, messages, published)
                .await
            {
                results.push(result);
            }
        }
    }

    /// Рассылает сообщения адресату.
    ///
    /// Порядок разрешения:
    /// 1. отправитель сам себе: ничего не делается;
    /// 2. адресат является зарегистрированным соединением: публикация в его канал;
    /// 3. иначе все источники, чей канал или связанный канал совпадает с
    ///    адресатом;
    /// 4. если п. 2 не сработал, каналы, связанные с адресатом по данным
    ///    резолвера.
    ///
    /// Каждый канал получает сообщения не больше одного раза за вызов.
    pub async fn broadcast(
        &self,
        from_id: &str,
        destination: &str,
        messages: &[Envelope],
    ) -> Vec<BroadcastResult> {
        let mut published = Published::default();
        self.broadcast_tracked(from_id, destination, messages, &mut published)
            .await
    }

    /// То же, что [`broadcast`](Self::broadcast), но с внешним набором
    /// уже обслуженных каналов.
    pub async fn broadcast_tracked(
        &self,
        from_id: &str,
        destination: &str,
        messages: &[Envelope],
        published: &mut Published,
    ) -> Vec<BroadcastResult> {
        let mut results = Vec::new();
        if from_id == destination || messages.is_empty() {
            return results;
        }

        if let Some(source) = self.sources.get(destination) {
            self.ensure_subscribed(&source);
            if let Some(result) = self
                .publish_channel(from_id, &source.channel_id, messages, published)
                .await
            {
                results.push(result);
            }
            return results;
        }

        let matching = self.sources.matching(from_id, destination);
        self.deliver_to_sources(from_id, &matching, messages, published, &mut results)
            .await;

        match self.resolver.related_channels(destination).await {
            Ok(related) => {
                for channel in related {
                    let sources = self.sources.in_channel(from_id, &channel);
                    self.deliver_to_sources(from_id, &sources, messages, published, &mut results)
                        .await;
                }
            }
            Err(e) => {
                warn!(
                    destination = %destination,
                    error = %e,
                    "Related channels unavailable, skipping"
                );
            }
        }

        results
    }

    /// Рассылает контекст: каналы по порядку, общий набор обслуженных
    /// каналов, общий `broadcast_id` в заголовках.
    pub async fn broadcast_ctx(
        &self,
        from_id: &str,
        ctx: BroadcastContext,
    ) -> Vec<BroadcastResult> {
        let broadcast_id = Uuid::new_v4().to_string();
        let mut published = Published::default();
        let mut all = Vec::new();

        for (key, channel) in ctx.into_channels() {
            let messages: Vec<Envelope> = channel
                .messages
                .into_iter()
                .map(|mut m| {
                    m.set_header(HEADER_BROADCAST_ID, broadcast_id.clone());
                    m
                })
                .collect();

            let results = self
                .broadcast_tracked(from_id, &channel.identifier, &messages, &mut published)
                .await;
            log_failures(&key, &results);

            if channel.use_finalizer {
                if let Some(finalizer) = &self.finalizer {
                    run_finalizer(finalizer.as_ref(), &key, &results).await;
                }
            }
            all.extend(results);
        }

        all
    }

    /// Рассылка с последующим вызовом финализатора.
    pub async fn broadcast_finalizer(
        &self,
        from_id: &str,
        destination: &str,
        messages: &[Envelope],
        finalizer: &dyn Finalizer,
    ) -> Vec<BroadcastResult> {
        let results = self.broadcast(from_id, destination, messages).await;
        log_failures(destination, &results);
        run_finalizer(finalizer, destination, &results).await;
        results
    }
}

/// Объединяет ошибки результатов рассылки.
pub fn join_results(results: &[BroadcastResult]) -> Result<(), StackError> {
    join_errors(results.iter().filter_map(|r| r.error.clone()))
}

fn log_failures(
    key: &str,
    results: &[BroadcastResult],
) {
    for result in results {
        if let Some(e) = &result.error {
            warn!(
                key = %key,
                channel = %result.channel_id,
                error = %e,
                "Broadcast delivery failed"
            );
        }
    }
}

async fn run_finalizer(
    finalizer: &dyn Finalizer,
    channel: &str,
    results: &[BroadcastResult],
) {
    if let Err(e) = finalizer.finalize(channel, results).await {
        let err = DeliveryError::Finalizer {
            channel: channel.to_string(),
            reason: e.to_string(),
        };
        error!(error = %err, "Finalizer failed");
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl ContextSink for Broadcaster {
    async fn dispatch(
        &self,
        from_id: &str,
        ctx: BroadcastContext,
    ) {
        self.broadcast_ctx(from_id, ctx).await;
    }
}

#[async_trait]
impl Producer for Broadcaster {
    fn id(&self) -> &str {
        &self.id
    }

    /// Адресаты берутся из `to` (список очищается), иначе из заголовка
    /// `broadcast_to`. Все адресаты обслуживаются одним набором каналов,
    /// так что канал получает конверт один раз.
    async fn produce(
        &self,
        envelope: &Envelope,
    ) -> Result<(), StackError> {
        let mut message = envelope.clone();
        let mut destinations = message.take_to();
        if destinations.is_empty() {
            if let Some(to) = message.header(HEADER_BROADCAST_TO).and_then(|v| v.as_str()) {
                destinations.push(to.to_string());
            }
        }
        if destinations.is_empty() {
            return Err(RoutingError::NoDestination {
                envelope_id: message.id.clone(),
            }
            .into());
        }

        let from_id = message.from_sender_id.clone();
        let messages = [message];
        let mut published = Published::default();
        let mut errors = Vec::new();
        for destination in &destinations {
            let results = self
                .broadcast_tracked(&from_id, destination, &messages, &mut published)
                .await;
            if let Err(e) = join_results(&results) {
                errors.push(e);
            }
        }
        join_errors(errors)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

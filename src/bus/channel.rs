use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};
use volna_error::{join_errors, StackError};

use super::Subscriber;
use crate::envelope::Envelope;

/// Шина одного канала.
pub struct Bus {
    key: String,
    subscribers: RwLock<HashMap<String, Arc<dyn Subscriber>>>,
    /// Дублирует размер карты, чтобы sweep пула не брал блокировку шины.
    subscriber_count: AtomicUsize,
    /// Количество успешных доставок
    pub delivered_count: AtomicU64,
    /// Количество неудачных доставок
    pub failed_count: AtomicU64,
}

/// Итог одной публикации.
#[derive(Debug, Default)]
pub struct PublishReport {
    pub delivered: usize,
    pub errors: Vec<StackError>,
}

impl PublishReport {
    pub fn into_result(self) -> Result<usize, StackError> {
        let delivered = self.delivered;
        join_errors(self.errors).map(|_| delivered)
    }
}

impl Bus {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            subscribers: RwLock::new(HashMap::new()),
            subscriber_count: AtomicUsize::new(0),
            delivered_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Подписывает получателя. Подписчик с тем же id заменяется.
    pub fn subscribe(
        &self,
        subscriber: Arc<dyn Subscriber>,
    ) -> String {
        let id = subscriber.id().to_string();
        let mut subscribers = self.subscribers.write();
        subscribers.insert(id.clone(), subscriber);
        self.subscriber_count
            .store(subscribers.len(), Ordering::Release);
        trace!(bus = %self.key, subscriber = %id, "Subscribed");
        id
    }

    pub fn unsubscribe(
        &self,
        id: &str,
    ) -> bool {
        let mut subscribers = self.subscribers.write();
        let removed = subscribers.remove(id).is_some();
        self.subscriber_count
            .store(subscribers.len(), Ordering::Release);
        if removed {
            trace!(bus = %self.key, subscriber = %id, "Unsubscribed");
        }
        removed
    }

    pub fn count_subscriptions(&self) -> usize {
        self.subscriber_count.load(Ordering::Acquire)
    }

    pub fn is_subscribed(
        &self,
        id: &str,
    ) -> bool {
        self.subscribers.read().contains_key(id)
    }

    /// Публикует конверты всем текущим подписчикам.
    ///
    /// Пустой `from_id` означает отсутствие отправителя: ничего не делается.
    /// Отправитель не исключается из рассылки. Список подписчиков снимается
    /// под блокировкой, доставка идёт уже без неё.
    pub async fn publish(
        &self,
        from_id: &str,
        messages: &[Envelope],
    ) -> PublishReport {
        let mut report = PublishReport::default();
        if from_id.is_empty() {
            debug!(bus = %self.key, "Publish without sender ignored");
            return report;
        }

        let snapshot: Vec<Arc<dyn Subscriber>> =
            self.subscribers.read().values().cloned().collect();

        for message in messages {
            for subscriber in &snapshot {
                match subscriber.publish(message.clone()).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        warn!(
                            bus = %self.key,
                            subscriber = %subscriber.id(),
                            error = %e,
                            "Delivery failed"
                        );
                        report.errors.push(e);
                    }
                }
            }
        }

        self.delivered_count
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.failed_count
            .fetch_add(report.errors.len() as u64, Ordering::Relaxed);
        report
    }
}

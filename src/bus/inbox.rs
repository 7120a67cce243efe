use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::error;
use volna_error::{DeliveryError, StackError};

use super::Subscriber;
use crate::envelope::Envelope;

/// Ограниченная очередь подписчика.
///
/// Публикация ждёт свободного места не дольше `publish_timeout`; после
/// этого сообщение отбрасывается и пишется `error!`.
#[derive(Debug, Clone)]
pub struct Inbox {
    id: String,
    tx: mpsc::Sender<Envelope>,
    publish_timeout: Duration,
}

impl Inbox {
    /// Создаёт очередь и возвращает её приёмную сторону.
    pub fn channel(
        id: impl Into<String>,
        capacity: usize,
        publish_timeout: Duration,
    ) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let inbox = Self {
            id: id.into(),
            tx,
            publish_timeout,
        };
        (inbox, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Отправляющая сторона очереди.
    pub fn sender(&self) -> mpsc::Sender<Envelope> {
        self.tx.clone()
    }
}

#[async_trait]
impl Subscriber for Inbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn publish(
        &self,
        envelope: Envelope,
    ) -> Result<(), StackError> {
        let message_id = envelope.id.clone();
        self.tx
            .send_timeout(envelope, self.publish_timeout)
            .await
            .map_err(|e| {
                let err = DeliveryError::from_send_timeout(&self.id, self.publish_timeout, e);
                error!(
                    subscriber = %self.id,
                    message_id = %message_id,
                    error = %err,
                    "Inbox delivery failed, message dropped"
                );
                StackError::new(err)
            })
    }
}

//! Интерфейс соединения, который предоставляет хост.

pub mod memory;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use volna_error::StackError;

use crate::{bus::Subscriber, envelope::Envelope};

pub use memory::MemoryConnection;

/// Соединение с клиентом.
#[async_trait]
pub trait Connection: Send + Sync {
    fn id(&self) -> &str;

    /// Передаёт соединению очередь, в которую оно кладёт входящие конверты.
    fn subscribe(
        &self,
        listener: mpsc::Sender<Envelope>,
    );

    /// Отправляет конверт клиенту.
    async fn publish(
        &self,
        envelope: Envelope,
    ) -> Result<(), StackError>;

    /// Произвольное значение, привязанное к соединению хостом.
    fn value(
        &self,
        key: &str,
    ) -> Option<Value>;
}

/// Событие жизненного цикла соединения.
#[derive(Clone)]
pub struct ConnectionEvent {
    pub connection: Arc<dyn Connection>,
    pub added: bool,
}

impl ConnectionEvent {
    pub fn added(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            added: true,
        }
    }

    pub fn removed(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            added: false,
        }
    }
}

impl fmt::Debug for ConnectionEvent {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ConnectionEvent")
            .field("connection", &self.connection.id())
            .field("added", &self.added)
            .finish()
    }
}

/// Подписчик шины, доставляющий сообщения прямо в соединение.
pub struct ConnectionSubscriber {
    connection: Arc<dyn Connection>,
}

impl ConnectionSubscriber {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl Subscriber for ConnectionSubscriber {
    fn id(&self) -> &str {
        self.connection.id()
    }

    async fn publish(
        &self,
        envelope: Envelope,
    ) -> Result<(), StackError> {
        self.connection.publish(envelope).await
    }
}

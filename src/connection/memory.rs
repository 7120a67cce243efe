use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use volna_error::{DeliveryError, StackError};

use super::Connection;
use crate::envelope::Envelope;

/// Соединение в памяти: копит отправленные клиенту конверты.
///
/// Используется во встраиваемых сценариях и в тестах.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    id: String,
    values: HashMap<String, Value>,
    listener: Mutex<Option<mpsc::Sender<Envelope>>>,
    outbox: Mutex<Vec<Envelope>>,
    closed: Mutex<bool>,
}

impl MemoryConnection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_value(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Имитирует входящее сообщение от клиента.
    pub async fn push_inbound(
        &self,
        envelope: Envelope,
    ) -> Result<(), StackError> {
        let listener = self.listener.lock().clone();
        let Some(listener) = listener else {
            return Err(DeliveryError::ConnectionClosed {
                connection_id: self.id.clone(),
            }
            .into());
        };
        listener
            .send(envelope)
            .await
            .map_err(|_| StackError::new(DeliveryError::ConnectionClosed {
                connection_id: self.id.clone(),
            }))
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Забирает всё, что было отправлено клиенту.
    pub fn take_published(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.outbox.lock())
    }

    pub fn published_len(&self) -> usize {
        self.outbox.lock().len()
    }

    /// После закрытия `publish` возвращает `ConnectionClosed`.
    pub fn close(&self) {
        *self.closed.lock() = true;
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn subscribe(
        &self,
        listener: mpsc::Sender<Envelope>,
    ) {
        *self.listener.lock() = Some(listener);
    }

    async fn publish(
        &self,
        envelope: Envelope,
    ) -> Result<(), StackError> {
        if *self.closed.lock() {
            return Err(DeliveryError::ConnectionClosed {
                connection_id: self.id.clone(),
            }
            .into());
        }
        self.outbox.lock().push(envelope);
        Ok(())
    }

    fn value(
        &self,
        key: &str,
    ) -> Option<Value> {
        self.values.get(key).cloned()
    }
}

use std::{any::Any, fmt, sync::Arc};

use serde_json::Value;
use volna_error::{EnvelopeError, StackError};

use crate::{
    broadcast::BroadcastContext,
    connection::Connection,
    envelope::{Envelope, Payload, TypedMessage},
};

/// Состояние обработки одного входящего сообщения.
pub struct RequestContext {
    responder_id: String,
    request: Envelope,
    connection: Option<Arc<dyn Connection>>,
    responses: Vec<Envelope>,
    error: Option<StackError>,
    broadcast: BroadcastContext,
    notify: BroadcastContext,
    emitted: Vec<Envelope>,
}

impl RequestContext {
    pub fn new(
        responder_id: impl Into<String>,
        request: Envelope,
        connection: Option<Arc<dyn Connection>>,
    ) -> Self {
        Self {
            responder_id: responder_id.into(),
            request,
            connection,
            responses: Vec::new(),
            error: None,
            broadcast: BroadcastContext::new(),
            notify: BroadcastContext::new(),
            emitted: Vec::new(),
        }
    }

    pub fn request(&self) -> &Envelope {
        &self.request
    }

    /// Типизированный запрос.
    pub fn typed<T: Any>(&self) -> Result<TypedMessage<'_, T>, EnvelopeError> {
        self.request.typed::<T>()
    }

    pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
        self.connection.as_ref()
    }

    /// Id соединения, либо отправитель запроса, если соединения нет.
    pub fn sender_id(&self) -> &str {
        self.connection
            .as_ref()
            .map(|c| c.id())
            .unwrap_or(self.request.from_sender_id.as_str())
    }

    /// Отправитель ответов (id роутера).
    pub fn responder_id(&self) -> &str {
        &self.responder_id
    }

    /// Значение, привязанное к соединению.
    pub fn value(
        &self,
        key: &str,
    ) -> Option<Value> {
        self.connection.as_ref().and_then(|c| c.value(key))
    }

    /// Последняя установленная ошибка побеждает.
    pub fn set_error(
        &mut self,
        error: impl Into<StackError>,
    ) {
        self.error = Some(error.into());
    }

    pub fn error(&self) -> Option<&StackError> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Добавляет ответ отправителю.
    pub fn respond(
        &mut self,
        envelope: Envelope,
    ) {
        self.responses.push(envelope);
    }

    /// Собирает ответ отправителю с указанным payload.
    pub fn reply<P: Payload>(
        &mut self,
        payload_type: impl Into<String>,
        payload: P,
    ) {
        let envelope = Envelope::new(payload_type, self.responder_id.clone(), payload)
            .with_to([self.sender_id().to_string()]);
        self.responses.push(envelope);
    }

    pub fn responses(&self) -> &[Envelope] {
        &self.responses
    }

    pub fn broadcast_mut(&mut self) -> &mut BroadcastContext {
        &mut self.broadcast
    }

    pub fn notify_mut(&mut self) -> &mut BroadcastContext {
        &mut self.notify
    }

    /// Ставит конверт в очередь продюсеров по умолчанию.
    pub fn emit(
        &mut self,
        envelope: Envelope,
    ) {
        self.emitted.push(envelope);
    }

    pub(crate) fn into_parts(self) -> RequestParts {
        RequestParts {
            request: self.request,
            responses: self.responses,
            error: self.error,
            broadcast: self.broadcast,
            notify: self.notify,
            emitted: self.emitted,
        }
    }
}

pub(crate) struct RequestParts {
    pub request: Envelope,
    pub responses: Vec<Envelope>,
    pub error: Option<StackError>,
    pub broadcast: BroadcastContext,
    pub notify: BroadcastContext,
    pub emitted: Vec<Envelope>,
}

impl fmt::Debug for RequestContext {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request", &self.request.id)
            .field("connection", &self.connection.as_ref().map(|c| c.id()))
            .field("responses", &self.responses.len())
            .field("error", &self.error)
            .field("broadcast", &self.broadcast.len())
            .field("notify", &self.notify.len())
            .field("emitted", &self.emitted.len())
            .finish()
    }
}

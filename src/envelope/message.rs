use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;
use volna_error::{EnvelopeError, StackError};

/// Полезная нагрузка конверта.
///
/// Реализуется автоматически для любого `Serialize + Debug` типа, поэтому
/// прикладной код просто кладёт в конверт свои структуры.
pub trait Payload: Any + Send + Sync + fmt::Debug {
    /// Доступ к конкретному типу для downcast.
    fn as_any(&self) -> &dyn Any;

    /// JSON-представление payload (wire-формат и мост для `translate`).
    fn to_json(&self) -> Result<Value, serde_json::Error>;

    /// Имя Rust-типа payload, используется в ошибках и логах.
    fn type_name(&self) -> &'static str;
}

/// Нетипизированный конверт сообщения.
#[derive(Clone)]
pub struct Envelope {
    pub id: String,
    /// Unix-время в миллисекундах.
    pub timestamp: i64,
    pub from_sender_id: String,
    pub payload_type: String,
    pub to: Vec<String>,
    headers: Option<HashMap<String, Value>>,
    payload: Arc<dyn Payload>,
    pub error: Option<StackError>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Envelope {
    /// Создаёт конверт с новым uuid v4 и текущей отметкой времени.
    pub fn new<P: Payload>(
        payload_type: impl Into<String>,
        from_sender_id: impl Into<String>,
        payload: P,
    ) -> Self {
        Self::from_parts(
            Uuid::new_v4().to_string(),
            chrono::Utc::now().timestamp_millis(),
            from_sender_id,
            payload_type,
            Arc::new(payload),
        )
    }

    /// Собирает конверт из готовых частей (используется десериализаторами).
    pub fn from_parts(
        id: impl Into<String>,
        timestamp: i64,
        from_sender_id: impl Into<String>,
        payload_type: impl Into<String>,
        payload: Arc<dyn Payload>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            from_sender_id: from_sender_id.into(),
            payload_type: payload_type.into(),
            to: Vec::new(),
            headers: None,
            payload,
            error: None,
        }
    }

    pub fn with_to<I, S>(
        mut self,
        to: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to = to.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_header(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.set_header(key, value);
        self
    }

    pub fn with_error(
        mut self,
        error: StackError,
    ) -> Self {
        self.error = Some(error);
        self
    }

    pub fn payload(&self) -> &dyn Payload {
        self.payload.as_ref()
    }

    pub fn payload_arc(&self) -> Arc<dyn Payload> {
        Arc::clone(&self.payload)
    }

    /// Возвращает копию конверта с другим payload (остальные поля те же).
    pub fn with_payload(
        &self,
        payload: Arc<dyn Payload>,
    ) -> Self {
        let mut env = self.clone();
        env.payload = payload;
        env
    }

    /// Payload как конкретный тип, если он им является.
    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload.as_any().downcast_ref::<T>()
    }

    pub fn headers(&self) -> Option<&HashMap<String, Value>> {
        self.headers.as_ref()
    }

    pub fn header(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.headers.as_ref().and_then(|h| h.get(key))
    }

    /// Устанавливает заголовок. Карта заголовков создаётся при первой записи.
    pub fn set_header(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
    }

    pub(crate) fn set_headers(
        &mut self,
        headers: Option<HashMap<String, Value>>,
    ) {
        self.headers = headers;
    }

    /// Забирает список адресатов, оставляя его пустым.
    pub fn take_to(&mut self) -> Vec<String> {
        std::mem::take(&mut self.to)
    }

    /// Проверяет обязательные поля: `id`, `timestamp`, `from`, `type`.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.id.trim().is_empty() {
            return Err(EnvelopeError::validation("id", "must not be empty"));
        }
        if self.timestamp == 0 {
            return Err(EnvelopeError::validation("timestamp", "must be set"));
        }
        if self.from_sender_id.trim().is_empty() {
            return Err(EnvelopeError::validation("from", "must not be empty"));
        }
        if self.payload_type.trim().is_empty() {
            return Err(EnvelopeError::validation("type", "must not be empty"));
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl<T> Payload for T
where
    T: Serialize + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("id", &self.id)
            .field("timestamp", &self.timestamp)
            .field("from", &self.from_sender_id)
            .field("type", &self.payload_type)
            .field("to", &self.to)
            .field("headers", &self.headers)
            .field("payload", &self.payload)
            .field("error", &self.error)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

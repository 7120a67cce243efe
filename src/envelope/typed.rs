use std::{any::Any, collections::HashMap};

use serde_json::Value;
use volna_error::EnvelopeError;

use super::Envelope;

/// Типизированная проекция конверта: только чтение, payload уже приведён
/// к `T`.
///
/// Построение проверяет тип payload и возвращает
/// [`EnvelopeError::TypeMismatch`], если он не совпадает.
#[derive(Debug, Clone, Copy)]
pub struct TypedMessage<'a, T> {
    envelope: &'a Envelope,
    payload: &'a T,
}

impl<'a, T: Any> TypedMessage<'a, T> {
    pub fn try_from_envelope(envelope: &'a Envelope) -> Result<Self, EnvelopeError> {
        let payload = envelope
            .payload_as::<T>()
            .ok_or_else(|| EnvelopeError::TypeMismatch {
                payload_type: envelope.payload_type.clone(),
                expected: std::any::type_name::<T>().to_string(),
            })?;
        Ok(Self { envelope, payload })
    }

    pub fn payload(&self) -> &'a T {
        self.payload
    }

    pub fn envelope(&self) -> &'a Envelope {
        self.envelope
    }

    pub fn id(&self) -> &'a str {
        &self.envelope.id
    }

    pub fn timestamp(&self) -> i64 {
        self.envelope.timestamp
    }

    pub fn from_sender_id(&self) -> &'a str {
        &self.envelope.from_sender_id
    }

    pub fn payload_type(&self) -> &'a str {
        &self.envelope.payload_type
    }

    pub fn to(&self) -> &'a [String] {
        &self.envelope.to
    }

    pub fn headers(&self) -> Option<&'a HashMap<String, Value>> {
        self.envelope.headers()
    }
}

impl Envelope {
    /// Типизированная проекция конверта.
    pub fn typed<T: Any>(&self) -> Result<TypedMessage<'_, T>, EnvelopeError> {
        TypedMessage::try_from_envelope(self)
    }
}

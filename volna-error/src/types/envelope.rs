use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки конверта: валидация обязательных полей, реестр типов,
/// (де)сериализация и типизированная проекция payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Не заполнено обязательное поле или payload не прошёл проверку
    #[error("invalid envelope: {field} {reason}")]
    Validation { field: String, reason: String },

    /// Тип payload не зарегистрирован в реестре
    #[error("unknown payload type '{payload_type}'")]
    UnknownPayloadType { payload_type: String },

    /// Не удалось разобрать байты в конверт
    #[error("failed to deserialize '{payload_type}': {reason}")]
    Deserialization {
        payload_type: String,
        reason: String,
    },

    /// Не удалось сериализовать конверт или payload
    #[error("failed to serialize '{payload_type}': {reason}")]
    Serialization {
        payload_type: String,
        reason: String,
    },

    /// Payload хранится не в том типе, который ожидает вызывающий
    #[error("payload of '{payload_type}' is not a {expected}")]
    TypeMismatch {
        payload_type: String,
        expected: String,
    },
}

impl EnvelopeError {
    pub fn validation(
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl ErrorExt for EnvelopeError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::ValidationFailed,
            Self::UnknownPayloadType { .. } => StatusCode::UnknownPayloadType,
            Self::Deserialization { .. } => StatusCode::DeserializationFailed,
            Self::Serialization { .. } => StatusCode::SerializationFailed,
            Self::TypeMismatch { .. } => StatusCode::TypeMismatch,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kind(&self) -> &'static str {
        "envelope"
    }

    fn log_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("kind", self.kind().to_string()),
            ("code", self.status_code().code().to_string()),
        ];

        match self {
            Self::UnknownPayloadType { payload_type }
            | Self::Deserialization { payload_type, .. }
            | Self::Serialization { payload_type, .. }
            | Self::TypeMismatch { payload_type, .. } => {
                tags.push(("payload_type", payload_type.clone()));
            }
            Self::Validation { field, .. } => {
                tags.push(("field", field.clone()));
            }
        }

        tags
    }
}

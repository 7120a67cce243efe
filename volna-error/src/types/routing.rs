use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки маршрутизации: тупики роутера и пула продюсеров, ошибки
/// построения пула и восстановленные паники обработчиков.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// Повторная регистрация. Никогда не возвращается вызывающему,
    /// только логируется.
    #[error("{kind} '{key}' is already registered")]
    DuplicateRegistration { kind: &'static str, key: String },

    /// Для типа нет ни своей цепочки обработчиков, ни fallback-цепочки
    #[error("no handlers registered for payload type '{payload_type}'")]
    NoHandlerRegistered { payload_type: String },

    /// Для типа нет ни конкретного продюсера, ни wildcard
    #[error("no producer for type '{payload_type}' nor wildcard")]
    NoProducerForType { payload_type: String },

    /// Пак, объявленный в конфигурации продюсера, не найден в реестре
    #[error("producer '{producer_id}' references unknown pack '{pack}'")]
    UnknownPack { producer_id: String, pack: String },

    /// В конфигурации упомянут продюсер, которого не передали в пул
    #[error("producer '{producer_id}' is configured but was not supplied")]
    UnknownProducer { producer_id: String },

    /// Пакет содержит конверты разных типов
    #[error("mixed batch: expected '{expected}', found '{found}'")]
    MixedBatch { expected: String, found: String },

    /// У конверта нет ни `to`, ни заголовка `broadcast_to`
    #[error("envelope '{envelope_id}' has no destination")]
    NoDestination { envelope_id: String },

    /// Обработчик или потребитель запаниковал; обработка сообщения прервана
    #[error("panic recovered while {during}: {message}")]
    PanicRecovered { during: String, message: String },
}

impl ErrorExt for RoutingError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::DuplicateRegistration { .. } => StatusCode::DuplicateRegistration,
            Self::NoHandlerRegistered { .. } => StatusCode::NoHandlerRegistered,
            Self::NoProducerForType { .. } => StatusCode::NoProducerForType,
            Self::UnknownPack { .. } => StatusCode::UnknownPack,
            Self::UnknownProducer { .. } => StatusCode::UnknownProducer,
            Self::MixedBatch { .. } => StatusCode::MixedBatch,
            Self::NoDestination { .. } => StatusCode::NoDestination,
            Self::PanicRecovered { .. } => StatusCode::PanicRecovered,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kind(&self) -> &'static str {
        "routing"
    }

    fn log_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("kind", self.kind().to_string()),
            ("code", self.status_code().code().to_string()),
        ];

        match self {
            Self::NoHandlerRegistered { payload_type }
            | Self::NoProducerForType { payload_type } => {
                tags.push(("payload_type", payload_type.clone()));
            }
            Self::UnknownPack { producer_id, pack } => {
                tags.push(("producer_id", producer_id.clone()));
                tags.push(("pack", pack.clone()));
            }
            Self::UnknownProducer { producer_id } => {
                tags.push(("producer_id", producer_id.clone()));
            }
            _ => {}
        }

        tags
    }
}

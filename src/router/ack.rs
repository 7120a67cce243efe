use serde::{Deserialize, Serialize};
use volna_error::StackError;

use crate::envelope::Envelope;

/// Тип payload подтверждения.
pub const ACK_PAYLOAD_TYPE: &str = "ack";

/// Строит подтверждение на входящий запрос.
///
/// `error` равен `None` при успешной обработке. Генератор сам решает, как
/// отразить ошибку в подтверждении.
pub trait AckGenerator: Send + Sync {
    fn ack(
        &self,
        request: &Envelope,
        error: Option<&StackError>,
    ) -> Envelope;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckPayload {
    pub request_id: String,
    pub request_type: String,
    pub ok: bool,
    /// Код ошибки, если обработка не удалась.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
}

/// Подтверждение с типом `ack`, адресованное отправителю запроса. Ошибка
/// прикладывается к конверту, её код дублируется в payload.
#[derive(Debug, Clone)]
pub struct DefaultAckGenerator {
    sender_id: String,
}

impl DefaultAckGenerator {
    pub fn new(sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
        }
    }
}

impl AckGenerator for DefaultAckGenerator {
    fn ack(
        &self,
        request: &Envelope,
        error: Option<&StackError>,
    ) -> Envelope {
        let payload = AckPayload {
            request_id: request.id.clone(),
            request_type: request.payload_type.clone(),
            ok: error.is_none(),
            code: error.map(|e| e.status_code().code()),
        };
        let ack = Envelope::new(ACK_PAYLOAD_TYPE, self.sender_id.clone(), payload)
            .with_to([request.from_sender_id.clone()]);
        match error {
            Some(e) => ack.with_error(e.clone()),
            None => ack,
        }
    }
}

#[cfg(test)]
mod tests {
    use volna_error::{RoutingError, StatusCode};

    use super::*;

    #[test]
    fn test_default_ack_refers_to_request() {
        let request = Envelope::new("ping", "conn-1", 1u8);
        let ack = DefaultAckGenerator::new("server").ack(&request, None);

        assert_eq!(ack.payload_type, ACK_PAYLOAD_TYPE);
        assert_eq!(ack.from_sender_id, "server");
        assert_eq!(ack.to, vec!["conn-1".to_string()]);
        assert!(ack.error.is_none());
        let payload = ack.payload_as::<AckPayload>().unwrap();
        assert_eq!(payload.request_id, request.id);
        assert!(payload.ok);
        assert_eq!(payload.code, None);
    }

    /// Тест проверяет, что генератор получает ошибку и строит по ней
    /// подтверждение.
    #[test]
    fn test_default_ack_carries_error() {
        let request = Envelope::new("chat.nope", "conn-1", 1u8);
        let error: StackError = RoutingError::NoHandlerRegistered {
            payload_type: "chat.nope".into(),
        }
        .into();
        let ack = DefaultAckGenerator::new("server").ack(&request, Some(&error));

        let payload = ack.payload_as::<AckPayload>().unwrap();
        assert!(!payload.ok);
        assert_eq!(payload.code, Some(StatusCode::NoHandlerRegistered.code()));
        assert!(ack.error.as_ref().unwrap().is(StatusCode::NoHandlerRegistered));
    }

    struct CodeOnly;

    impl AckGenerator for CodeOnly {
        fn ack(
            &self,
            request: &Envelope,
            error: Option<&StackError>,
        ) -> Envelope {
            let code = error.map_or(0, |e| e.status_code().code());
            Envelope::new(ACK_PAYLOAD_TYPE, "custom", code).with_to([request.from_sender_id.clone()])
        }
    }

    /// Тест проверяет, что внешний генератор сам формирует payload из кода
    /// ошибки.
    #[test]
    fn test_custom_generator_sees_error() {
        let request = Envelope::new("t", "c1", 1u8);
        let error: StackError = RoutingError::NoDestination {
            envelope_id: "e1".into(),
        }
        .into();

        let ack = CodeOnly.ack(&request, Some(&error));
        assert_eq!(
            ack.payload_as::<u32>(),
            Some(&StatusCode::NoDestination.code())
        );
        assert_eq!(CodeOnly.ack(&request, None).payload_as::<u32>(), Some(&0));
    }
}

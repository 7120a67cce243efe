//! JSON wire-формат конверта.
//!
//! ```json
//! {"id":"…","timestamp":1700000000000,"from":"conn-1","type":"ping",
//!  "to":["conn-2"],"headers":{"k":"v"},"payload":{…},"error":{"code":4000,"message":"…"}}
//! ```
//!
//! `to`, `headers` и `error` необязательны.

use std::{collections::HashMap, sync::Arc};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use volna_error::{EnvelopeError, ErrorResponse, StackError};

use super::{Envelope, Payload};

#[derive(Serialize)]
struct WireEnvelopeRef<'a> {
    id: &'a str,
    timestamp: i64,
    from: &'a str,
    #[serde(rename = "type")]
    payload_type: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    to: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<&'a HashMap<String, Value>>,
    payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorResponse>,
}

#[derive(Deserialize)]
struct WireEnvelope<P> {
    id: String,
    timestamp: i64,
    from: String,
    #[serde(rename = "type")]
    payload_type: String,
    #[serde(default)]
    to: Vec<String>,
    #[serde(default)]
    headers: Option<HashMap<String, Value>>,
    payload: P,
    #[serde(default)]
    error: Option<ErrorResponse>,
}

#[derive(Deserialize)]
struct Discriminator {
    #[serde(rename = "type")]
    payload_type: String,
}

/// Кодирует конверт в JSON.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
    let serialization = |reason: String| EnvelopeError::Serialization {
        payload_type: envelope.payload_type.clone(),
        reason,
    };

    let payload = envelope
        .payload()
        .to_json()
        .map_err(|e| serialization(e.to_string()))?;

    let wire = WireEnvelopeRef {
        id: &envelope.id,
        timestamp: envelope.timestamp,
        from: &envelope.from_sender_id,
        payload_type: &envelope.payload_type,
        to: &envelope.to,
        headers: envelope.headers(),
        payload,
        error: envelope.error.as_ref().map(StackError::to_response),
    };

    serde_json::to_vec(&wire).map_err(|e| serialization(e.to_string()))
}

/// Декодирует конверт, payload которого имеет тип `T`.
pub fn decode<T>(raw: &[u8]) -> Result<Envelope, EnvelopeError>
where
    T: Payload + DeserializeOwned,
{
    let wire: WireEnvelope<T> =
        serde_json::from_slice(raw).map_err(|e| EnvelopeError::Deserialization {
            payload_type: peek_payload_type(raw).unwrap_or_default(),
            reason: e.to_string(),
        })?;

    let mut envelope = Envelope::from_parts(
        wire.id,
        wire.timestamp,
        wire.from,
        wire.payload_type,
        Arc::new(wire.payload),
    );
    envelope.to = wire.to;
    envelope.set_headers(wire.headers);
    envelope.error = wire.error.map(StackError::from_response);
    Ok(envelope)
}

/// Извлекает только дискриминатор `type`, не разбирая payload.
pub fn peek_payload_type(raw: &[u8]) -> Result<String, EnvelopeError> {
    serde_json::from_slice::<Discriminator>(raw)
        .map(|d| d.payload_type)
        .map_err(|e| EnvelopeError::Deserialization {
            payload_type: String::new(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use volna_error::{RoutingError, StatusCode};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Join {
        room: String,
        members: Vec<String>,
    }

    /// Тест проверяет, что кодирование и декодирование сохраняют все поля
    /// и payload глубоко равен исходному.
    #[test]
    fn test_encode_decode_preserves_fields() {
        let payload = Join {
            room: "room-1".to_string(),
            members: vec!["a".to_string(), "b".to_string()],
        };
        let env = Envelope::new("room.join", "conn-1", payload.clone())
            .with_to(["conn-2"])
            .with_header("trace", "abc");

        let raw = encode(&env).unwrap();
        let back = decode::<Join>(&raw).unwrap();

        assert_eq!(back.id, env.id);
        assert_eq!(back.timestamp, env.timestamp);
        assert_eq!(back.from_sender_id, "conn-1");
        assert_eq!(back.to, vec!["conn-2".to_string()]);
        assert_eq!(back.header("trace"), Some(&Value::from("abc")));
        assert_eq!(back.payload_as::<Join>(), Some(&payload));
    }

    /// Тест проверяет, что ошибка конверта переживает wire-формат вместе с
    /// кодом статуса.
    #[test]
    fn test_error_survives_wire() {
        let err = StackError::new(RoutingError::NoHandlerRegistered {
            payload_type: "x".to_string(),
        });
        let env = Envelope::new("ack", "srv", Value::Null).with_error(err);

        let raw = encode(&env).unwrap();
        let back = decode::<Value>(&raw).unwrap();
        assert!(back
            .error
            .as_ref()
            .unwrap()
            .is(StatusCode::NoHandlerRegistered));
    }

    #[test]
    fn test_peek_payload_type() {
        let raw = br#"{"type":"ping","payload":{}}"#;
        assert_eq!(peek_payload_type(raw).unwrap(), "ping");
        assert!(peek_payload_type(b"not json").is_err());
    }

    /// Тест проверяет, что неверный payload даёт ошибку десериализации с
    /// именем типа.
    #[test]
    fn test_decode_bad_payload() {
        let raw = br#"{"id":"1","timestamp":1,"from":"a","type":"room.join","payload":{"room":5}}"#;
        match decode::<Join>(raw) {
            Err(EnvelopeError::Deserialization { payload_type, .. }) => {
                assert_eq!(payload_type, "room.join")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}

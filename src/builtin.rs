//! Встроенный пак `core` и обработчики для эталонного сервера.

use serde::{Deserialize, Serialize};
use volna_error::EnvelopeError;

use crate::{
    envelope::Envelope,
    registry::{Pack, PackEntry, Validate},
    router::{handler_fn, Router},
};

pub const CORE_PACK: &str = "core";
pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const CHAT_MESSAGE: &str = "chat.message";

/// Максимальная длина текста сообщения чата в байтах.
pub const MAX_CHAT_TEXT: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
}

/// Сообщение в комнату. Комната это канал рассылки.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub room: String,
    pub text: String,
}

impl Validate for ChatMessage {
    fn validate(&self) -> Result<(), EnvelopeError> {
        if self.room.trim().is_empty() {
            return Err(EnvelopeError::validation("room", "must not be empty"));
        }
        if self.text.len() > MAX_CHAT_TEXT {
            return Err(EnvelopeError::validation(
                "text",
                format!("exceeds {MAX_CHAT_TEXT} bytes"),
            ));
        }
        Ok(())
    }
}

pub fn core_pack() -> Pack {
    Pack::new(CORE_PACK)
        .with(PackEntry::of::<Ping>(PING, false))
        .with(PackEntry::of::<Pong>(PONG, false))
        .with(PackEntry::checked::<ChatMessage>(CHAT_MESSAGE))
}

/// Регистрирует обработчики `ping` и `chat.message`.
///
/// `ping` отвечает `pong` с тем же nonce. `chat.message` рассылается в
/// свою комнату; если у сообщения заполнен `to`, копия уходит продюсерам
/// по умолчанию.
pub fn install_handlers(router: &Router) {
    router.register(
        PING,
        vec![handler_fn("ping.reply", |ctx| {
            let nonce = ctx
                .request()
                .payload_as::<Ping>()
                .and_then(|ping| ping.nonce);
            ctx.reply(PONG, Pong { nonce });
        })],
    );

    router.register(
        CHAT_MESSAGE,
        vec![handler_fn("chat.broadcast", |ctx| {
            let room = ctx
                .typed::<ChatMessage>()
                .map(|message| message.payload().room.clone());
            let room = match room {
                Ok(room) => room,
                Err(e) => {
                    ctx.set_error(e);
                    return;
                }
            };

            let outbound = Envelope::from_parts(
                uuid::Uuid::new_v4().to_string(),
                chrono::Utc::now().timestamp_millis(),
                ctx.sender_id().to_string(),
                CHAT_MESSAGE.to_string(),
                ctx.request().payload_arc(),
            );

            if !ctx.request().to.is_empty() {
                let direct = outbound.clone().with_to(ctx.request().to.clone());
                ctx.emit(direct);
            }
            ctx.broadcast_mut().add(room.clone(), room, outbound);
        })],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{registry::TypeRegistry, router::ACK_PAYLOAD_TYPE};

    /// Тест проверяет, что пак регистрирует все встроенные типы.
    #[test]
    fn test_core_pack_registers() {
        let registry = TypeRegistry::new();
        let report = registry.register_pack(core_pack());
        assert!(report.is_complete());
        assert_eq!(
            registry.payload_types(),
            vec![CHAT_MESSAGE.to_string(), PING.to_string(), PONG.to_string()]
        );
    }

    #[test]
    fn test_chat_message_validation() {
        let ok = ChatMessage {
            room: "lobby".into(),
            text: "hi".into(),
        };
        assert!(ok.validate().is_ok());

        let empty_room = ChatMessage {
            room: " ".into(),
            text: "hi".into(),
        };
        assert!(empty_room.validate().is_err());
    }

    /// Тест проверяет ответ `pong` с тем же nonce.
    #[tokio::test]
    async fn test_ping_replies_pong() {
        let router = Router::builder("server").build();
        install_handlers(&router);

        let out = router
            .route(
                &(std::sync::Arc::new(crate::connection::MemoryConnection::new("c1"))
                    as std::sync::Arc<dyn crate::connection::Connection>),
                Envelope::new(PING, "c1", Ping { nonce: Some(3) }),
            )
            .await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].payload_type, ACK_PAYLOAD_TYPE);
        assert_eq!(out[1].payload_type, PONG);
        assert_eq!(out[1].payload_as::<Pong>(), Some(&Pong { nonce: Some(3) }));
        assert_eq!(out[1].to, vec!["c1".to_string()]);
    }
}

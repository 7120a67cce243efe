//! Конверт сообщения и его типизированное представление.
//!
//! Конверт ([`Envelope`]) несёт идентификатор, отметку времени, отправителя,
//! тип payload (дискриминатор), список адресатов, заголовки и сам payload.
//! Payload хранится как `Arc<dyn Payload>` и после сборки конверта не
//! меняется.

pub mod codec;
pub mod message;
pub mod typed;

pub use codec::{decode, encode, peek_payload_type};
pub use message::{Envelope, Payload};
pub use typed::TypedMessage;

/// Ключ wildcard: продюсер/правило для всех типов payload.
pub const ANY_PAYLOAD_TYPE: &str = "*";

/// Ключ fallback: используется, только если не нашлось ни конкретного,
/// ни wildcard-совпадения.
pub const NO_MATCH_PAYLOAD_TYPE: &str = "!";

/// Заголовок с идентификатором рассылки (проставляется `broadcast_ctx`).
pub const HEADER_BROADCAST_ID: &str = "broadcast_id";

/// Заголовок с адресатом рассылки, если список `to` пуст.
pub const HEADER_BROADCAST_TO: &str = "broadcast_to";

/// Заголовок с идентификатором соединения, через которое пришёл запрос.
pub const HEADER_CONNECTION_ID: &str = "connection_id";

//! Входящая маршрутизация.
//!
//! Для каждого типа payload хранится цепочка обработчиков. Обработчики
//! работают с [`RequestContext`]; после успешной обработки клиент получает
//! подтверждение и ответы, а собранные рассылки уходят в фоне.

pub mod ack;
pub mod context;
pub mod dispatch;
pub mod handler;
pub mod watcher;

pub use ack::{AckGenerator, AckPayload, DefaultAckGenerator, ACK_PAYLOAD_TYPE};
pub use context::RequestContext;
pub use dispatch::{Router, RouterBuilder};
pub use handler::{handler_fn, FnHandler, Handler};
pub use watcher::ConnectionWatcher;

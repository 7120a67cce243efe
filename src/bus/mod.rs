//! Каналы публикации/подписки.
//!
//! [`Bus`] рассылает конверты всем своим подписчикам, [`BusPool`] хранит
//! шины по ключу канала и периодически удаляет пустые.

pub mod channel;
pub mod inbox;
pub mod pool;

use async_trait::async_trait;
use volna_error::StackError;

use crate::envelope::Envelope;

pub use channel::{Bus, PublishReport};
pub use inbox::Inbox;
pub use pool::{BusPool, BusPoolConfig};

/// Получатель сообщений шины.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Уникальный идентификатор подписчика в пределах шины.
    fn id(&self) -> &str;

    async fn publish(
        &self,
        envelope: Envelope,
    ) -> Result<(), StackError>;
}

//! Рассылка по каналам.
//!
//! [`Broadcaster`] ведёт таблицу источников (соединение → канал и связанные
//! каналы), лениво подписывает их на шины каналов и разрешает адресата
//! рассылки: соединение, канал, связанный канал.

pub mod broadcaster;
pub mod context;
pub mod resolver;
pub mod source;

use async_trait::async_trait;
use volna_error::StackError;

pub use broadcaster::{BroadcastResult, Broadcaster, Published};
pub use context::{BroadcastContext, ChannelBroadcast};
pub use resolver::{ChannelInfo, ChannelInfoResolver, StaticChannelResolver};
pub use source::{Source, SourceTable};

/// Получатель контекста рассылки, собранного обработчиками роутера.
#[async_trait]
pub trait ContextSink: Send + Sync {
    async fn dispatch(
        &self,
        from_id: &str,
        ctx: BroadcastContext,
    );
}

/// Вызывается после рассылки в канал, помеченный `use_finalizer`.
#[async_trait]
pub trait Finalizer: Send + Sync {
    async fn finalize(
        &self,
        channel: &str,
        results: &[BroadcastResult],
    ) -> Result<(), StackError>;
}

//! Исходящая маршрутизация: какой продюсер получает конверт данного типа.

pub mod emitter;
pub mod forwarder;
pub mod pool;

use async_trait::async_trait;
use volna_error::{join_errors, StackError};

use crate::envelope::Envelope;

pub use emitter::DefaultEmitter;
pub use forwarder::{ForwardRule, Forwarder, ForwarderBuilder, ProducerRule};
pub use pool::{ProducersPool, ProducersPoolConfig};

/// Получатель исходящих конвертов (очередь, рассылка, внешний сервис).
#[async_trait]
pub trait Producer: Send + Sync {
    fn id(&self) -> &str;

    async fn produce(
        &self,
        envelope: &Envelope,
    ) -> Result<(), StackError>;

    /// Пакет конвертов одного типа. По умолчанию поштучно, с
    /// объединением ошибок.
    async fn produce_batch(
        &self,
        envelopes: &[Envelope],
    ) -> Result<(), StackError> {
        let mut errors = Vec::new();
        for envelope in envelopes {
            if let Err(e) = self.produce(envelope).await {
                errors.push(e);
            }
        }
        join_errors(errors)
    }
}

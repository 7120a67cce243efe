use std::sync::Arc;

use tracing::warn;
use volna_error::{join_errors, StackError};

use super::Producer;
use crate::envelope::Envelope;

/// Явный набор продюсеров по умолчанию.
///
/// Передаётся роутеру при построении; обработчики ставят исходящие
/// конверты через `RequestContext::emit`.
#[derive(Clone, Default)]
pub struct DefaultEmitter {
    producers: Vec<Arc<dyn Producer>>,
}

impl DefaultEmitter {
    pub fn new(producers: Vec<Arc<dyn Producer>>) -> Self {
        Self { producers }
    }

    pub fn with(
        mut self,
        producer: Arc<dyn Producer>,
    ) -> Self {
        self.producers.push(producer);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    /// Отдаёт пакет каждому продюсеру набора.
    pub async fn emit(
        &self,
        envelopes: &[Envelope],
    ) -> Result<(), StackError> {
        if envelopes.is_empty() {
            return Ok(());
        }
        let mut errors = Vec::new();
        for producer in &self.producers {
            if let Err(e) = producer.produce_batch(envelopes).await {
                warn!(producer = %producer.id(), error = %e, "Emit failed");
                errors.push(e);
            }
        }
        join_errors(errors)
    }
}

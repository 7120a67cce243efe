use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, warn};
use volna_error::{join_errors, RoutingError, StackError};

use super::Producer;
use crate::envelope::{Envelope, ANY_PAYLOAD_TYPE, NO_MATCH_PAYLOAD_TYPE};

/// Правило пересылки пакета конвертов одного типа.
#[async_trait]
pub trait ForwardRule: Send + Sync {
    async fn forward(
        &self,
        envelopes: &[Envelope],
    ) -> Result<(), StackError>;
}

/// Правило, отдающее пакет продюсеру.
pub struct ProducerRule(pub Arc<dyn Producer>);

#[async_trait]
impl ForwardRule for ProducerRule {
    async fn forward(
        &self,
        envelopes: &[Envelope],
    ) -> Result<(), StackError> {
        self.0.produce_batch(envelopes).await
    }
}

/// Продюсер, выбирающий правила по типу первого конверта пакета.
///
/// Wildcard-правило применяется всегда, конкретное при наличии, fallback
/// только если нет ни того, ни другого.
pub struct Forwarder {
    id: String,
    rules: HashMap<String, Arc<dyn ForwardRule>>,
}

#[derive(Default)]
pub struct ForwarderBuilder {
    rules: HashMap<String, Arc<dyn ForwardRule>>,
}

impl ForwarderBuilder {
    /// Добавляет правило. Повторное правило для типа игнорируется.
    pub fn rule(
        mut self,
        payload_type: impl Into<String>,
        rule: Arc<dyn ForwardRule>,
    ) -> Self {
        let payload_type = payload_type.into();
        if self.rules.contains_key(&payload_type) {
            let err = RoutingError::DuplicateRegistration {
                kind: "forward rule",
                key: payload_type,
            };
            warn!(error = %err, "Registration rejected, keeping the original");
            return self;
        }
        self.rules.insert(payload_type, rule);
        self
    }

    pub fn build(
        self,
        id: impl Into<String>,
    ) -> Forwarder {
        Forwarder {
            id: id.into(),
            rules: self.rules,
        }
    }
}

impl Forwarder {
    pub fn builder() -> ForwarderBuilder {
        ForwarderBuilder::default()
    }

    fn rules_for(
        &self,
        payload_type: &str,
    ) -> Vec<Arc<dyn ForwardRule>> {
        let mut selected: Vec<Arc<dyn ForwardRule>> = Vec::with_capacity(2);
        if let Some(rule) = self.rules.get(ANY_PAYLOAD_TYPE) {
            selected.push(Arc::clone(rule));
        }
        if payload_type != ANY_PAYLOAD_TYPE {
            if let Some(rule) = self.rules.get(payload_type) {
                selected.push(Arc::clone(rule));
            }
        }
        if selected.is_empty() {
            if let Some(rule) = self.rules.get(NO_MATCH_PAYLOAD_TYPE) {
                selected.push(Arc::clone(rule));
            }
        }
        selected
    }
}

#[async_trait]
impl Producer for Forwarder {
    fn id(&self) -> &str {
        &self.id
    }

    async fn produce(
        &self,
        envelope: &Envelope,
    ) -> Result<(), StackError> {
        self.produce_batch(std::slice::from_ref(envelope)).await
    }

    async fn produce_batch(
        &self,
        envelopes: &[Envelope],
    ) -> Result<(), StackError> {
        let Some(first) = envelopes.first() else {
            return Ok(());
        };
        let payload_type = first.payload_type.as_str();

        if let Some(other) = envelopes.iter().find(|e| e.payload_type != payload_type) {
            return Err(RoutingError::MixedBatch {
                expected: payload_type.to_string(),
                found: other.payload_type.clone(),
            }
            .into());
        }

        let rules = self.rules_for(payload_type);
        if rules.is_empty() {
            return Err(RoutingError::NoProducerForType {
                payload_type: payload_type.to_string(),
            }
            .into());
        }

        debug!(
            forwarder = %self.id,
            payload_type = %payload_type,
            rules = rules.len(),
            batch = envelopes.len(),
            "Forwarding batch"
        );

        let mut errors = Vec::new();
        for rule in rules {
            if let Err(e) = rule.forward(envelopes).await {
                errors.push(e);
            }
        }
        join_errors(errors)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use volna_error::StatusCode;

    use super::*;

    #[derive(Default)]
    struct Tally(Mutex<usize>);

    #[async_trait]
    impl ForwardRule for Tally {
        async fn forward(
            &self,
            envelopes: &[Envelope],
        ) -> Result<(), StackError> {
            *self.0.lock() += envelopes.len();
            Ok(())
        }
    }

    fn forwarder(rules: &[(&str, Arc<Tally>)]) -> Forwarder {
        rules
            .iter()
            .fold(Forwarder::builder(), |b, (t, r)| b.rule(*t, r.clone()))
            .build("fwd")
    }

    /// Тест проверяет, что wildcard срабатывает вместе с конкретным
    /// правилом, а fallback нет.
    #[tokio::test]
    async fn test_wildcard_plus_specific() {
        let any = Arc::new(Tally::default());
        let specific = Arc::new(Tally::default());
        let fallback = Arc::new(Tally::default());
        let fwd = forwarder(&[
            ("*", any.clone()),
            ("t", specific.clone()),
            ("!", fallback.clone()),
        ]);

        fwd.produce(&Envelope::new("t", "a", 1u8)).await.unwrap();
        assert_eq!(*any.0.lock(), 1);
        assert_eq!(*specific.0.lock(), 1);
        assert_eq!(*fallback.0.lock(), 0);
    }

    #[tokio::test]
    async fn test_fallback_when_nothing_matches() {
        let specific = Arc::new(Tally::default());
        let fallback = Arc::new(Tally::default());
        let fwd = forwarder(&[("t", specific.clone()), ("!", fallback.clone())]);

        fwd.produce(&Envelope::new("u", "a", 1u8)).await.unwrap();
        assert_eq!(*specific.0.lock(), 0);
        assert_eq!(*fallback.0.lock(), 1);

        let bare = forwarder(&[("t", specific)]);
        let err = bare.produce(&Envelope::new("u", "a", 1u8)).await.unwrap_err();
        assert!(err.is(StatusCode::NoProducerForType));
    }

    /// Тест проверяет, что смешанный пакет отклоняется до запуска правил.
    #[tokio::test]
    async fn test_mixed_batch_rejected() {
        let specific = Arc::new(Tally::default());
        let fwd = forwarder(&[("t", specific.clone())]);

        let batch = vec![Envelope::new("t", "a", 1u8), Envelope::new("u", "a", 2u8)];
        let err = fwd.produce_batch(&batch).await.unwrap_err();
        assert!(err.is(StatusCode::MixedBatch));
        assert_eq!(*specific.0.lock(), 0);
        assert!(fwd.produce_batch(&[]).await.is_ok());
    }

    #[test]
    fn test_duplicate_rule_first_wins() {
        let first = Arc::new(Tally::default());
        let fwd = forwarder(&[("t", first.clone()), ("t", Arc::new(Tally::default()))]);
        assert_eq!(fwd.rules.len(), 1);
    }
}

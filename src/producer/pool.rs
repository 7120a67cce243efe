use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use volna_error::{join_errors, RoutingError, StackError};

use super::Producer;
use crate::{
    envelope::{Envelope, ANY_PAYLOAD_TYPE, NO_MATCH_PAYLOAD_TYPE},
    registry::TypeRegistry,
};

/// Какие типы и паки обслуживает каждый продюсер.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProducersPoolConfig {
    pub supported_types_by_producer_id: HashMap<String, Vec<String>>,
    pub supported_packs_by_producer_id: HashMap<String, Vec<String>>,
}

/// Пул продюсеров, разложенных по типам payload.
///
/// После построения не меняется, поэтому обходится без блокировок.
pub struct ProducersPool {
    id: String,
    by_type: HashMap<String, Vec<Arc<dyn Producer>>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ProducersPool {
    /// Строит пул. Продюсеры обходятся в переданном порядке.
    ///
    /// Продюсер с маркером `*` среди типов или паков регистрируется только
    /// как wildcard. Неизвестный пак или продюсер из конфигурации, которого
    /// не передали, прерывают построение.
    pub fn new(
        id: impl Into<String>,
        config: &ProducersPoolConfig,
        producers: Vec<Arc<dyn Producer>>,
        registry: &TypeRegistry,
    ) -> Result<Self, StackError> {
        let id = id.into();
        let supplied: HashSet<&str> = producers.iter().map(|p| p.id()).collect();
        for producer_id in config
            .supported_types_by_producer_id
            .keys()
            .chain(config.supported_packs_by_producer_id.keys())
        {
            if !supplied.contains(producer_id.as_str()) {
                return Err(RoutingError::UnknownProducer {
                    producer_id: producer_id.clone(),
                }
                .into());
            }
        }

        let mut pool = Self {
            id,
            by_type: HashMap::new(),
        };

        for producer in producers {
            let types = config
                .supported_types_by_producer_id
                .get(producer.id())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let packs = config
                .supported_packs_by_producer_id
                .get(producer.id())
                .map(Vec::as_slice)
                .unwrap_or_default();

            if types.is_empty() && packs.is_empty() {
                warn!(producer = %producer.id(), "Producer has no configured types, ignored");
                continue;
            }

            let wildcard = types
                .iter()
                .chain(packs.iter())
                .any(|t| t == ANY_PAYLOAD_TYPE);
            if wildcard {
                pool.add(ANY_PAYLOAD_TYPE, &producer);
                continue;
            }

            for payload_type in types {
                pool.add(payload_type, &producer);
            }

            for pack_name in packs {
                let pack = registry.pack(pack_name).ok_or_else(|| RoutingError::UnknownPack {
                    producer_id: producer.id().to_string(),
                    pack: pack_name.clone(),
                })?;
                for payload_type in pack.payload_types() {
                    pool.add(payload_type, &producer);
                }
            }
        }

        info!(
            pool = %pool.id,
            types = pool.by_type.len(),
            "Producers pool built"
        );
        Ok(pool)
    }

    fn add(
        &mut self,
        payload_type: &str,
        producer: &Arc<dyn Producer>,
    ) {
        let list = self.by_type.entry(payload_type.to_string()).or_default();
        if list.iter().any(|p| p.id() == producer.id()) {
            debug!(
                producer = %producer.id(),
                payload_type = %payload_type,
                "Producer already registered for type, skipping"
            );
            return;
        }
        list.push(Arc::clone(producer));
    }

    /// Продюсеры для типа: конкретные, затем wildcard, без повторов по id.
    /// Fallback-продюсеры берутся, только если не нашлось ни тех, ни других.
    pub fn producers_for(
        &self,
        payload_type: &str,
    ) -> Vec<Arc<dyn Producer>> {
        let mut seen = HashSet::new();
        let mut selected = Vec::new();

        let specific = self.by_type.get(payload_type).into_iter().flatten();
        let wildcard = self.by_type.get(ANY_PAYLOAD_TYPE).into_iter().flatten();
        for producer in specific.chain(wildcard) {
            if seen.insert(producer.id().to_string()) {
                selected.push(Arc::clone(producer));
            }
        }

        if selected.is_empty() {
            if let Some(fallback) = self.by_type.get(NO_MATCH_PAYLOAD_TYPE) {
                selected.extend(fallback.iter().cloned());
            }
        }
        selected
    }

    pub fn supports(
        &self,
        payload_type: &str,
    ) -> bool {
        !self.producers_for(payload_type).is_empty()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl Producer for ProducersPool {
    fn id(&self) -> &str {
        &self.id
    }

    async fn produce(
        &self,
        envelope: &Envelope,
    ) -> Result<(), StackError> {
        envelope.validate()?;

        let producers = self.producers_for(&envelope.payload_type);
        if producers.is_empty() {
            return Err(RoutingError::NoProducerForType {
                payload_type: envelope.payload_type.clone(),
            }
            .into());
        }

        let mut errors = Vec::new();
        for producer in producers {
            if let Err(e) = producer.produce(envelope).await {
                warn!(
                    producer = %producer.id(),
                    message_id = %envelope.id,
                    error = %e,
                    "Producer failed"
                );
                errors.push(e);
            }
        }
        join_errors(errors)
    }

    /// Группирует конверты по типу (в порядке первого появления) и отдаёт
    /// каждую группу продюсерам этого типа.
    async fn produce_batch(
        &self,
        envelopes: &[Envelope],
    ) -> Result<(), StackError> {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<Envelope>> = HashMap::new();
        let mut errors = Vec::new();

        for envelope in envelopes {
            if let Err(e) = envelope.validate() {
                errors.push(StackError::new(e));
                continue;
            }
            let key = envelope.payload_type.as_str();
            groups
                .entry(key)
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(envelope.clone());
        }

        for payload_type in order {
            let Some(group) = groups.get(payload_type) else {
                continue;
            };
            let producers = self.producers_for(payload_type);
            if producers.is_empty() {
                errors.push(StackError::new(RoutingError::NoProducerForType {
                    payload_type: payload_type.to_string(),
                }));
                continue;
            }
            for producer in producers {
                if let Err(e) = producer.produce_batch(group).await {
                    errors.push(e);
                }
            }
        }

        join_errors(errors)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

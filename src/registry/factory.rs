use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tracing::{debug, warn};
use volna_error::{EnvelopeError, RoutingError};

use super::{Pack, PackEntry};
use crate::envelope::{self, Envelope, Payload};

/// Реестр типов payload.
///
/// Потокобезопасен; десериализаторы вызываются вне блокировки.
#[derive(Default)]
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<String, PackEntry>,
    packs: HashMap<String, Pack>,
}

/// Итог регистрации пака.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackReport {
    pub pack: String,
    /// Типы, зарегистрированные этим вызовом.
    pub registered: Vec<String>,
    /// Типы, уже занятые ранее (оставлены как были).
    pub skipped: Vec<String>,
    /// Пак с таким именем уже был зарегистрирован, вызов ничего не сделал.
    pub already_known: bool,
}

impl PackReport {
    /// Все записи пака зарегистрированы этим вызовом.
    pub fn is_complete(&self) -> bool {
        !self.already_known && self.skipped.is_empty()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Регистрирует один тип.
    ///
    /// Возвращает `false`, если тип уже известен: прежняя запись остаётся.
    pub fn register(
        &self,
        entry: PackEntry,
    ) -> bool {
        let mut inner = self.inner.write();
        inner.insert_entry(entry)
    }

    /// Регистрирует пак целиком.
    ///
    /// Известный пак пропускается полностью. Конфликтующие записи нового
    /// пака пропускаются по одной, остальные регистрируются.
    pub fn register_pack(
        &self,
        pack: Pack,
    ) -> PackReport {
        let mut inner = self.inner.write();
        let mut report = PackReport {
            pack: pack.name().to_string(),
            ..Default::default()
        };

        if inner.packs.contains_key(pack.name()) {
            debug!(pack = %pack.name(), "Pack already registered, skipping");
            report.already_known = true;
            return report;
        }

        for entry in pack.entries() {
            let payload_type = entry.payload_type().to_string();
            if inner.insert_entry(entry.clone()) {
                report.registered.push(payload_type);
            } else {
                report.skipped.push(payload_type);
            }
        }

        debug!(
            pack = %report.pack,
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            "Pack registered"
        );
        inner.packs.insert(pack.name().to_string(), pack);
        report
    }

    pub fn pack(
        &self,
        name: &str,
    ) -> Option<Pack> {
        self.inner.read().packs.get(name).cloned()
    }

    pub fn contains(
        &self,
        payload_type: &str,
    ) -> bool {
        self.inner.read().entries.contains_key(payload_type)
    }

    /// Все известные типы, отсортированные.
    pub fn payload_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.inner.read().entries.keys().cloned().collect();
        types.sort();
        types
    }

    /// Разбирает сырые байты по дискриминатору `type`.
    pub fn create_from_bytes(
        &self,
        raw: &[u8],
    ) -> Result<Envelope, EnvelopeError> {
        let payload_type = envelope::peek_payload_type(raw)?;
        let deserializer = self
            .inner
            .read()
            .entries
            .get(&payload_type)
            .map(|entry| Arc::clone(entry.deserializer()))
            .ok_or_else(|| EnvelopeError::UnknownPayloadType {
                payload_type: payload_type.clone(),
            })?;

        deserializer(raw)
    }

    /// Переводит значение в канонический тип зарегистрированного типа
    /// payload.
    pub fn translate(
        &self,
        payload_type: &str,
        value: &dyn Payload,
    ) -> Result<Arc<dyn Payload>, EnvelopeError> {
        let translator = self
            .inner
            .read()
            .entries
            .get(payload_type)
            .map(|entry| Arc::clone(entry.translator()))
            .ok_or_else(|| EnvelopeError::UnknownPayloadType {
                payload_type: payload_type.to_string(),
            })?;

        translator(value)
    }

    /// Кодирует конверт в wire-формат. Тип должен быть известен реестру.
    pub fn to_bytes(
        &self,
        envelope: &Envelope,
    ) -> Result<Vec<u8>, EnvelopeError> {
        if !self.contains(&envelope.payload_type) {
            return Err(EnvelopeError::UnknownPayloadType {
                payload_type: envelope.payload_type.clone(),
            });
        }
        envelope::encode(envelope)
    }
}

impl RegistryInner {
    fn insert_entry(
        &mut self,
        entry: PackEntry,
    ) -> bool {
        if self.entries.contains_key(entry.payload_type()) {
            let err = RoutingError::DuplicateRegistration {
                kind: "payload type",
                key: entry.payload_type().to_string(),
            };
            warn!(error = %err, "Registration rejected, keeping the original");
            return false;
        }
        self.entries
            .insert(entry.payload_type().to_string(), entry);
        true
    }
}

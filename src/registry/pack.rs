use std::{fmt, sync::Arc};

use serde::de::DeserializeOwned;
use volna_error::EnvelopeError;

use crate::envelope::{self, Envelope, Payload};

/// Превращает сырые байты в конверт конкретного типа.
pub type Deserializer = Arc<dyn Fn(&[u8]) -> Result<Envelope, EnvelopeError> + Send + Sync>;

/// Переводит произвольное значение в канонический тип payload.
pub type Translator =
    Arc<dyn Fn(&dyn Payload) -> Result<Arc<dyn Payload>, EnvelopeError> + Send + Sync>;

/// Проверка содержимого payload после десериализации.
pub trait Validate {
    fn validate(&self) -> Result<(), EnvelopeError>;
}

/// Запись реестра для одного типа payload.
#[derive(Clone)]
pub struct PackEntry {
    payload_type: String,
    deserializer: Deserializer,
    translator: Translator,
    validate: bool,
}

/// Именованный упорядоченный набор записей.
#[derive(Clone, Debug)]
pub struct Pack {
    name: String,
    entries: Vec<PackEntry>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl PackEntry {
    pub fn new(
        payload_type: impl Into<String>,
        deserializer: Deserializer,
        translator: Translator,
        validate: bool,
    ) -> Self {
        Self {
            payload_type: payload_type.into(),
            deserializer,
            translator,
            validate,
        }
    }

    /// Запись для serde-типа `T`.
    ///
    /// При `validate = true` десериализатор дополнительно проверяет
    /// обязательные поля конверта.
    pub fn of<T>(
        payload_type: impl Into<String>,
        validate: bool,
    ) -> Self
    where
        T: Payload + DeserializeOwned + Clone,
    {
        let deserializer: Deserializer = Arc::new(move |raw: &[u8]| {
            let env = envelope::decode::<T>(raw)?;
            if validate {
                env.validate()?;
            }
            Ok(env)
        });
        Self::new(payload_type, deserializer, translator_for::<T>(), validate)
    }

    /// Запись для типа с собственной проверкой содержимого.
    ///
    /// Всегда валидирует и конверт, и payload.
    pub fn checked<T>(payload_type: impl Into<String>) -> Self
    where
        T: Payload + DeserializeOwned + Clone + Validate,
    {
        let deserializer: Deserializer = Arc::new(|raw: &[u8]| {
            let env = envelope::decode::<T>(raw)?;
            env.validate()?;
            if let Some(payload) = env.payload_as::<T>() {
                payload.validate()?;
            }
            Ok(env)
        });
        Self::new(payload_type, deserializer, translator_for::<T>(), true)
    }

    pub fn payload_type(&self) -> &str {
        &self.payload_type
    }

    pub fn validates(&self) -> bool {
        self.validate
    }

    pub fn deserializer(&self) -> &Deserializer {
        &self.deserializer
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }
}

impl Pack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn with(
        mut self,
        entry: PackEntry,
    ) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[PackEntry] {
        &self.entries
    }

    /// Типы payload пака в порядке объявления.
    pub fn payload_types(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(PackEntry::payload_type)
    }
}

/// Транслятор через JSON: значение того же типа клонируется, остальное
/// проходит через `to_json` и разбирается заново.
fn translator_for<T>() -> Translator
where
    T: Payload + DeserializeOwned + Clone,
{
    Arc::new(|value: &dyn Payload| {
        if let Some(same) = value.as_any().downcast_ref::<T>() {
            return Ok(Arc::new(same.clone()) as Arc<dyn Payload>);
        }
        let target = std::any::type_name::<T>().to_string();
        let json = value.to_json().map_err(|e| EnvelopeError::Serialization {
            payload_type: value.type_name().to_string(),
            reason: e.to_string(),
        })?;
        let translated: T =
            serde_json::from_value(json).map_err(|e| EnvelopeError::Deserialization {
                payload_type: target,
                reason: e.to_string(),
            })?;
        Ok(Arc::new(translated) as Arc<dyn Payload>)
    })
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for PackEntry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PackEntry")
            .field("payload_type", &self.payload_type)
            .field("validate", &self.validate)
            .finish_non_exhaustive()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

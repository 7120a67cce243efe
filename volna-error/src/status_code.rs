use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Код ошибки, который уходит клиенту в ack-конверте.
///
/// Тысячи задают семейство: `1xxx` общие, `2xxx` конверт и payload,
/// `3xxx` регистрация, `4xxx` маршрутизация, `5xxx` доставка, `6xxx`
/// среда исполнения. Числа стабильны, клиенты сравнивают их напрямую.
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,
    NotImplemented = 1005,
    Multiple = 1006,

    // === 2xxx: Конверт и данные ===
    ValidationFailed = 2000,
    UnknownPayloadType = 2001,
    DeserializationFailed = 2002,
    SerializationFailed = 2003,
    TypeMismatch = 2004,

    // === 3xxx: Регистрация ===
    DuplicateRegistration = 3000,
    UnknownPack = 3001,
    UnknownProducer = 3002,

    // === 4xxx: Маршрутизация ===
    NoHandlerRegistered = 4000,
    NoProducerForType = 4001,
    NoDestination = 4002,
    MixedBatch = 4003,
    HandlerFailed = 4004,

    // === 5xxx: Доставка ===
    PublishTimeout = 5000,
    InboxClosed = 5001,
    ConnectionClosed = 5002,
    ChannelInfoUnavailable = 5003,
    FinalizerFailed = 5004,

    // === 6xxx: Среда исполнения / IO ===
    PanicRecovered = 6000,
    Io = 6001,
    Timeout = 6002,
    ConfigInvalid = 6003,
    NotFound = 6004,
}

/// Уровень, с которым ошибка пишется в лог.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// `None` для чисел, которых нет среди вариантов.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Семейство кода: номер тысячи.
    pub const fn family(self) -> u32 {
        self.code() / 1000
    }

    /// Имеет ли смысл отправителю повторить сообщение позже.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::PublishTimeout | Self::Timeout | Self::ChannelInfoUnavailable
        )
    }

    /// Виноват отправитель: плохой конверт или адресация.
    pub fn is_client_error(self) -> bool {
        matches!(self.family(), 2 | 4)
    }

    pub fn is_registration_error(self) -> bool {
        self.family() == 3
    }

    pub fn is_delivery_error(self) -> bool {
        self.family() == 5
    }

    /// Текст таких ошибок клиенту не показывается.
    pub fn is_hidden_from_client(self) -> bool {
        matches!(
            self,
            Self::Unknown | Self::Unexpected | Self::Internal | Self::PanicRecovered
        )
    }

    pub fn log_level(self) -> LogLevel {
        use StatusCode::*;
        match self {
            Success => LogLevel::Trace,
            NotFound | NoDestination => LogLevel::Debug,
            ValidationFailed | UnknownPayloadType | DeserializationFailed | TypeMismatch
            | NoHandlerRegistered | HandlerFailed => LogLevel::Info,
            Internal | PanicRecovered | UnknownPack | UnknownProducer => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        let name: &str = self.as_ref();
        #[cfg(not(feature = "strum"))]
        let name = format!("{self:?}");
        write!(f, "{name} ({})", self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_families() {
        assert_eq!(StatusCode::Success.family(), 0);
        assert!(StatusCode::ValidationFailed.is_client_error());
        assert!(StatusCode::MixedBatch.is_client_error());
        assert!(StatusCode::UnknownPack.is_registration_error());
        assert!(StatusCode::InboxClosed.is_delivery_error());
        assert!(!StatusCode::PanicRecovered.is_client_error());
    }

    /// Тест проверяет, что повторять имеет смысл только временные отказы.
    #[test]
    fn test_retryable() {
        assert!(StatusCode::PublishTimeout.is_retryable());
        assert!(StatusCode::ChannelInfoUnavailable.is_retryable());
        assert!(!StatusCode::ConnectionClosed.is_retryable());
        assert!(!StatusCode::NoHandlerRegistered.is_retryable());
    }

    #[test]
    fn test_numeric_conversion() {
        let n: u32 = StatusCode::MixedBatch.into();
        assert_eq!(n, 4003);
        assert_eq!(StatusCode::from_u32(n), Some(StatusCode::MixedBatch));
        assert_eq!(StatusCode::from_u32(7777), None);
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(StatusCode::NoDestination.log_level(), LogLevel::Debug);
        assert_eq!(StatusCode::HandlerFailed.log_level(), LogLevel::Info);
        assert_eq!(StatusCode::PublishTimeout.log_level(), LogLevel::Warn);
        assert_eq!(StatusCode::PanicRecovered.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            StatusCode::NoHandlerRegistered.to_string(),
            "NoHandlerRegistered (4000)"
        );
    }
}

use std::{fmt, panic::Location, sync::Arc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "serde")]
use crate::GenericError;
use crate::{ErrorExt, LogLevel, StatusCode};

/// Ошибка с цепочкой контекстов.
///
/// Клонирование не копирует ни корневую ошибку, ни контексты: одна и та
/// же ошибка прикладывается к ack-конверту, пишется в лог и уходит в
/// объединённую ошибку рассылки.
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    chain: Arc<[ErrorContext]>,
}

/// Одно звено цепочки. Для ошибок, пришедших по сети, места вызова нет.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub location: Option<&'static Location<'static>>,
}

/// Поле `error` конверта на проводе.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<String>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    #[track_caller]
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            chain: Arc::from(Vec::new()),
        }
    }

    /// Дописывает звено в конец цепочки, запоминая место вызова.
    #[track_caller]
    pub fn context(
        self,
        msg: impl Into<String>,
    ) -> Self {
        self.push_context(ErrorContext {
            message: msg.into(),
            location: Some(Location::caller()),
        })
    }

    fn push_context(
        self,
        ctx: ErrorContext,
    ) -> Self {
        let chain: Vec<ErrorContext> = self.chain.iter().cloned().chain([ctx]).collect();
        Self {
            root: self.root,
            chain: chain.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    /// `true`, если код ошибки совпадает с `code`.
    pub fn is(
        &self,
        code: StatusCode,
    ) -> bool {
        self.status_code() == code
    }

    /// Сообщение, которое можно показать клиенту.
    pub fn client_message(&self) -> String {
        self.root.client_message()
    }

    pub fn root(&self) -> &dyn ErrorExt {
        self.root.as_ref()
    }

    pub fn contexts(&self) -> &[ErrorContext] {
        &self.chain
    }

    pub fn downcast_ref<T: ErrorExt + 'static>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }

    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    /// Поле `error` конверта.
    ///
    /// Контексты с местами вызова уходят клиенту только в debug-сборке.
    #[cfg(feature = "serde")]
    pub fn to_response(&self) -> ErrorResponse {
        let contexts = (cfg!(debug_assertions) && !self.chain.is_empty())
            .then(|| self.chain.iter().map(format_context).collect());
        ErrorResponse {
            code: self.status_code().code(),
            message: self.client_message(),
            contexts,
        }
    }

    /// Восстанавливает ошибку из поля `error` полученного конверта.
    ///
    /// Неизвестный код становится [`StatusCode::Unknown`].
    #[cfg(feature = "serde")]
    pub fn from_response(response: ErrorResponse) -> Self {
        let code = StatusCode::from_u32(response.code).unwrap_or(StatusCode::Unknown);
        let mut err = Self::new(GenericError::new(code, response.message));
        for message in response.contexts.unwrap_or_default() {
            err = err.push_context(ErrorContext {
                message,
                location: None,
            });
        }
        err
    }
}

fn format_context(ctx: &ErrorContext) -> String {
    match ctx.location {
        Some(loc) => format!("{} ({}:{})", ctx.message, loc.file(), loc.line()),
        None => ctx.message.clone(),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StackError
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut debug = f.debug_struct("StackError");
        debug
            .field("code", &self.status_code())
            .field("root", &self.root.log_message());
        if !self.chain.is_empty() {
            let chain: Vec<String> = self.chain.iter().map(format_context).collect();
            debug.field("contexts", &chain);
        }
        debug.finish()
    }
}

/// Контексты от внешнего к внутреннему, затем корневая ошибка:
/// `connection loop: router dispatch: no handlers registered for 'x'`.
impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for ctx in self.chain.iter().rev() {
            write!(f, "{}: ", ctx.message)?;
        }
        write!(f, "{}", self.root)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    #[track_caller]
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

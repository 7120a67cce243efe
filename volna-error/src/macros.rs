//! Макросы раннего выхода и расширения `Result` для приклеивания
//! контекста.

/// Возвращает `Err(StackError)` из текущей функции.
///
/// - `bail!(err)`: готовая ошибка, реализующая `ErrorExt`;
/// - `bail!(code, "fmt", args...)`: `GenericError` с кодом и
///   отформатированным сообщением.
///
/// ```ignore
/// bail!(StatusCode::InvalidArgs, "channel too long: {} bytes", channel.len());
/// ```
#[macro_export]
macro_rules! bail {
    ($err:expr $(,)?) => {
        return Err($crate::StackError::from($err))
    };
    ($code:expr, $($fmt:tt)+) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, format!($($fmt)+))
        ))
    };
}

/// `bail!`, если условие ложно. Аргументы после условия те же, что у
/// `bail!`.
///
/// ```ignore
/// ensure!(capacity > 0, StatusCode::ConfigInvalid, "capacity must be positive");
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($rest:tt)+) => {
        if !($cond) {
            $crate::bail!($($rest)+);
        }
    };
}

/// Оборачивает ошибку `Result` в `StackError` с контекстом; сообщение
/// форматируется только при ошибке.
///
/// ```ignore
/// let envelope = context!(registry.create_from_bytes(raw), "frame from {}", peer)?;
/// ```
#[macro_export]
macro_rules! context {
    ($result:expr, $($fmt:tt)+) => {
        $crate::ResultExt::with_context($result, || format!($($fmt)+))
    };
}

/// Контекст для любых `Result`, чья ошибка приводится к `StackError`.
pub trait ResultExt<T> {
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>;

    /// Ленивый вариант: `f` вызывается только при ошибке.
    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into().context(ctx)),
        }
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into().context(f())),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

pub mod delivery;
pub mod envelope;
pub mod multi;
pub mod routing;

pub use delivery::*;
pub use envelope::*;
pub use multi::*;
pub use routing::*;

use std::{any::Any, fmt, io};

use crate::{ErrorExt, StackError, StatusCode};

/// Ошибка с произвольным кодом. Её возвращают обработчики роутера и
/// внешние продюсеры, которым не нужен свой тип.
#[derive(Debug, Clone)]
pub struct GenericError {
    code: StatusCode,
    message: String,
}

impl GenericError {
    pub fn new(
        code: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for GenericError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GenericError {}

impl ErrorExt for GenericError {
    fn status_code(&self) -> StatusCode {
        self.code
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Код для ошибки ввода-вывода сокета или файла. Обрыв соединения в любой
/// форме означает [`StatusCode::ConnectionClosed`].
fn io_status(kind: io::ErrorKind) -> StatusCode {
    use io::ErrorKind::*;
    match kind {
        NotFound => StatusCode::NotFound,
        TimedOut => StatusCode::Timeout,
        UnexpectedEof | BrokenPipe | ConnectionReset | ConnectionAborted | NotConnected => {
            StatusCode::ConnectionClosed
        }
        _ => StatusCode::Io,
    }
}

impl From<io::Error> for StackError {
    #[track_caller]
    fn from(err: io::Error) -> Self {
        StackError::new(GenericError::new(io_status(err.kind()), err.to_string()))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

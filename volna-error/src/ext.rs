use std::{any::Any, error::Error};

use crate::StatusCode;

/// Общий интерфейс ошибок Volna. Object-safe: корень `StackError` хранится
/// как `Arc<dyn ErrorExt>`.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Код, уходящий клиенту в ack-конверте.
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    fn as_any(&self) -> &dyn Any;

    /// Короткое имя семейства ошибок для логов.
    fn kind(&self) -> &'static str {
        "generic"
    }

    /// Текст для клиента. Внутренние ошибки и паники скрываются.
    fn client_message(&self) -> String {
        if self.status_code().is_hidden_from_client() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }

    fn log_message(&self) -> String {
        format!("{self:?}")
    }

    /// Пары ключ-значение, которые роутер добавляет к записи лога о
    /// неудачном запросе. Первыми всегда идут `kind` и `code`.
    fn log_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("kind", self.kind().to_string()),
            ("code", self.status_code().code().to_string()),
        ]
    }
}

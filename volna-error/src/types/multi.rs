use std::{any::Any, fmt};

use crate::{ErrorExt, StackError, StatusCode};

/// Объединённая ошибка: результат fan-out по нескольким продюсерам,
/// группам или адресатам. Ни одна из ошибок не теряется.
#[derive(Debug, Clone)]
pub struct MultiError {
    errors: Vec<StackError>,
}

impl MultiError {
    /// Возвращает все составляющие ошибки в порядке появления.
    pub fn errors(&self) -> &[StackError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for MultiError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let parts: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{} errors: {}", self.errors.len(), parts.join("; "))
    }
}

impl std::error::Error for MultiError {}

impl ErrorExt for MultiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::Multiple
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kind(&self) -> &'static str {
        "multi"
    }

    fn client_message(&self) -> String {
        let parts: Vec<String> = self.errors.iter().map(|e| e.client_message()).collect();
        parts.join("; ")
    }
}

/// Объединяет ошибки в одну.
///
/// - пусто → `Ok(())`;
/// - одна ошибка → она сама, без обёртки;
/// - несколько → [`MultiError`]; вложенные `MultiError` раскрываются.
pub fn join_errors<I>(errors: I) -> Result<(), StackError>
where
    I: IntoIterator<Item = StackError>,
{
    let mut flat = Vec::new();
    for err in errors {
        match err.downcast_ref::<MultiError>() {
            Some(multi) => flat.extend(multi.errors.iter().cloned()),
            None => flat.push(err),
        }
    }

    match flat.len() {
        0 => Ok(()),
        1 => Err(flat.remove(0)),
        _ => Err(StackError::new(MultiError { errors: flat })),
    }
}

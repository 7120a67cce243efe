use tracing_appender::non_blocking::WorkerGuard;

/// Владелец фоновых писателей логов.
///
/// Пока handle жив, неблокирующий файловый вывод работает; `shutdown`
/// сбрасывает буферы.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self { file_guard }
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Сбрасывает буферы файлового вывода.
    pub fn shutdown(mut self) {
        tracing::info!(file_sink = self.has_file_sink(), "Logging shutdown");
        drop(self.file_guard.take());
    }
}

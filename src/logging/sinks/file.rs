use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling::daily};
use tracing_subscriber::{layer::Layer, registry::LookupSpan};

use crate::logging::{config::LoggingConfig, formatter};

/// Файловый слой с суточной ротацией и неблокирующей записью.
///
/// `WorkerGuard` нужно держать до завершения работы, иначе хвост логов
/// потеряется.
pub fn layer_with_config<S>(config: &LoggingConfig) -> (Box<dyn Layer<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = daily(&config.file.dir, &config.file.prefix);
    let (writer, guard) = non_blocking(appender);
    let layer = formatter::build_layer(config, config.file.format, writer, false);
    (layer, guard)
}

#[cfg(test)]
mod tests {
    use tracing::info;
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;

    /// Тест проверяет, что после сброса guard в каталоге появляется файл
    /// лога.
    #[test]
    fn test_file_layer_writes_to_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = LoggingConfig::default();
        cfg.file.enabled = true;
        cfg.file.dir = tmp.path().to_path_buf();

        let (layer, guard) = layer_with_config::<Registry>(&cfg);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || info!("to file"));
        drop(guard);

        let files: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }
}

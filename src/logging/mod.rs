//! Настройка `tracing`: фильтр, консольный и файловый вывод.

pub mod config;
pub mod filters;
pub mod formatter;
pub mod handle;
pub mod sinks;

pub use config::{FileSinkConfig, LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use volna_error::{GenericError, StackError, StatusCode, VolnaResult};

/// Устанавливает глобальный subscriber по конфигурации.
///
/// Повторная инициализация в том же процессе возвращает ошибку.
pub fn init_logging(config: &LoggingConfig) -> VolnaResult<LoggingHandle> {
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter_from_config(config);
    let mut layers = Vec::new();

    layers.push(formatter::build_layer(
        config,
        config.format,
        std::io::stdout,
        config.with_ansi,
    ));

    let file_guard = if config.file.enabled {
        let (file_layer, guard) = sinks::file::layer_with_config(config);
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| {
            StackError::new(GenericError::new(
                StatusCode::ConfigInvalid,
                format!("logging already initialized: {e}"),
            ))
        })?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = ?config.format,
        file_enabled = config.file.enabled,
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}

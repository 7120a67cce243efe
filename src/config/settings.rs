use std::{path::Path, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use volna_error::{ensure, StatusCode, VolnaResult};

use crate::{bus::BusPoolConfig, logging::LoggingConfig, producer::ProducersPoolConfig};

/// Переменная окружения с путём к файлу конфигурации.
pub const CONFIG_PATH_ENV: &str = "VOLNA_CONFIG";

/// Настройки процесса.
///
/// Источники по возрастанию приоритета: значения по умолчанию, файл,
/// переменные окружения `VOLNA_<СЕКЦИЯ>__<КЛЮЧ>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub bus: BusPoolConfig,
    pub producers: ProducersPoolConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen_address: String,
    /// Отправитель подтверждений и ответов роутера.
    pub server_id: String,
    /// Ёмкость очередей соединения (входящей и исходящей).
    pub inbox_capacity: usize,
    /// Сколько ждать места в исходящей очереди, прежде чем отбросить
    /// сообщение.
    pub publish_timeout_ms: u64,
    /// Ёмкость канала событий соединений.
    pub event_capacity: usize,
    /// Предельная длина входящего кадра в байтах. Более длинные кадры
    /// отбрасываются.
    pub max_frame_bytes: usize,
}

impl Settings {
    /// Загружает настройки; путь к файлу берётся из `VOLNA_CONFIG`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = ServerSettings::default();
        let mut builder = Config::builder()
            // Добавляем значения по умолчанию
            .set_default("server.listen_address", defaults.listen_address)?
            .set_default("server.server_id", defaults.server_id)?
            .set_default("server.inbox_capacity", defaults.inbox_capacity as u64)?
            .set_default("server.publish_timeout_ms", defaults.publish_timeout_ms)?
            .set_default("server.max_frame_bytes", defaults.max_frame_bytes as u64)?
            .set_default(
                "bus.sweep_interval_secs",
                BusPoolConfig::default().sweep_interval_secs,
            )?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let cfg = builder
            // Переменные окружения с префиксом VOLNA_
            .add_source(
                Environment::with_prefix("VOLNA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }

    pub fn validate(&self) -> VolnaResult<()> {
        ensure!(
            !self.server.listen_address.trim().is_empty(),
            StatusCode::ConfigInvalid,
            "server.listen_address must not be empty"
        );
        ensure!(
            !self.server.server_id.trim().is_empty(),
            StatusCode::ConfigInvalid,
            "server.server_id must not be empty"
        );
        ensure!(
            self.server.inbox_capacity > 0,
            StatusCode::ConfigInvalid,
            "server.inbox_capacity must be positive"
        );
        ensure!(
            self.server.publish_timeout_ms > 0,
            StatusCode::ConfigInvalid,
            "server.publish_timeout_ms must be positive"
        );
        ensure!(
            self.server.max_frame_bytes > 0,
            StatusCode::ConfigInvalid,
            "server.max_frame_bytes must be positive"
        );
        ensure!(
            self.bus.sweep_interval_secs > 0,
            StatusCode::ConfigInvalid,
            "bus.sweep_interval_secs must be positive"
        );
        self.logging.validate()
    }
}

impl ServerSettings {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:7420".to_string(),
            server_id: "volna".to_string(),
            inbox_capacity: 256,
            publish_timeout_ms: 250,
            event_capacity: 1024,
            max_frame_bytes: 64 * 1024,
        }
    }
}

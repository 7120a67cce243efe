use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use volna_error::{ensure, StatusCode, VolnaResult};

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Формат вывода событий.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Настройки логирования.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень по умолчанию (`trace`..`error`, `off`).
    pub level: String,
    /// Уровни для отдельных модулей, например `volna::bus = "trace"`.
    pub modules: BTreeMap<String, String>,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub file: FileSinkConfig,
}

/// Файловый вывод с суточной ротацией.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSinkConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub prefix: String,
    pub format: LogFormat,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LoggingConfig {
    /// Проверяет уровни и параметры файлового вывода.
    pub fn validate(&self) -> VolnaResult<()> {
        ensure!(
            LEVELS.contains(&self.level.as_str()),
            StatusCode::ConfigInvalid,
            "unknown log level '{}'",
            self.level
        );
        for (module, level) in &self.modules {
            ensure!(
                LEVELS.contains(&level.as_str()),
                StatusCode::ConfigInvalid,
                "unknown log level '{}' for module '{}'",
                level,
                module
            );
        }
        if self.file.enabled {
            ensure!(
                !self.file.prefix.trim().is_empty(),
                StatusCode::ConfigInvalid,
                "log file prefix must not be empty"
            );
        }
        Ok(())
    }

    /// Директива `EnvFilter`: общий уровень и уровни модулей.
    pub fn build_filter_directive(&self) -> String {
        let mut parts = vec![self.level.clone()];
        parts.extend(
            self.modules
                .iter()
                .map(|(module, level)| format!("{module}={level}")),
        );
        parts.join(",")
    }

    /// Создаёт каталог логов, если файловый вывод включён.
    pub fn ensure_log_dir(&self) -> std::io::Result<()> {
        if self.file.enabled {
            std::fs::create_dir_all(&self.file.dir)?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            modules: BTreeMap::new(),
            format: LogFormat::Pretty,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            file: FileSinkConfig::default(),
        }
    }
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("logs"),
            prefix: "volna.log".to_string(),
            format: LogFormat::Json,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

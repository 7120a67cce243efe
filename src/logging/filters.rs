use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

/// Фильтр событий: `RUST_LOG`, если задан, иначе директива из конфига.
pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    let directive = config.build_filter_directive();

    match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => match EnvFilter::try_new(&directive) {
            Ok(filter) => filter,
            Err(e) => {
                eprintln!(
                    "Invalid log filter directive from config ('{directive}'): {e}; falling back to 'info'"
                );
                EnvFilter::new("info")
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use serial_test::serial;

    use super::*;

    /// Тест проверяет, что без `RUST_LOG` используется директива конфига.
    #[test]
    #[serial]
    fn test_filter_from_config_directive() {
        let saved = env::var("RUST_LOG").ok();
        env::remove_var("RUST_LOG");

        let mut cfg = LoggingConfig::default();
        cfg.level = "warn".to_string();
        cfg.modules
            .insert("volna::bus".to_string(), "trace".to_string());
        let filter = build_filter_from_config(&cfg).to_string();
        assert!(filter.contains("warn"), "got: {filter}");
        assert!(filter.contains("volna::bus=trace"), "got: {filter}");

        if let Some(v) = saved {
            env::set_var("RUST_LOG", v);
        }
    }

    /// Тест проверяет, что `RUST_LOG` имеет приоритет над конфигом.
    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        let saved = env::var("RUST_LOG").ok();
        env::set_var("RUST_LOG", "volna=debug");

        let filter = build_filter_from_config(&LoggingConfig::default()).to_string();
        assert!(filter.contains("volna=debug"), "got: {filter}");

        match saved {
            Some(v) => env::set_var("RUST_LOG", v),
            None => env::remove_var("RUST_LOG"),
        }
    }

    /// Тест проверяет откат к `info` при некорректной директиве.
    #[test]
    #[serial]
    fn test_invalid_directive_falls_back() {
        let saved = env::var("RUST_LOG").ok();
        env::remove_var("RUST_LOG");

        let mut cfg = LoggingConfig::default();
        cfg.level = "volna=loud".to_string();
        let filter = build_filter_from_config(&cfg).to_string();
        assert_eq!(filter, "info");

        if let Some(v) = saved {
            env::set_var("RUST_LOG", v);
        }
    }
}

pub mod settings;

pub use settings::{ServerSettings, Settings, CONFIG_PATH_ENV};

//! Shared configuration and domain vocabulary for the shopdb workspace.

mod app_config;
mod config;
mod entities;
mod locales;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use entities::EntityKind;
pub use locales::{
    is_language_code, load_locales, load_locales_or_builtin, LocaleEntry, LocaleMessages,
    LocalesFile,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read locales file {path}: {source}")]
    LocalesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse locales file: {0}")]
    LocalesFileParse(#[from] serde_yaml::Error),

    #[error("locales validation failed: {0}")]
    Validation(String),
}

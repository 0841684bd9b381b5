use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::QaDeskError;

pub const DEFAULT_CONFIG_FILE: &str = "qadesk.toml";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub answer_service_url: String,
    pub host: String,
    pub port: u16,
    pub pool_size: u32,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: Self::DATABASE_URL.to_owned(),
            answer_service_url: Self::ANSWER_SERVICE_URL.to_owned(),
            host: Self::HOST.to_owned(),
            port: Self::PORT,
            pool_size: Self::POOL_SIZE,
            log_level: Self::LOG_LEVEL.to_owned(),
        }
    }
}

impl Config {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

    const DATABASE_URL: &str = "qadesk.db";
    const ANSWER_SERVICE_URL: &str = "http://localhost:5000";
    const HOST: &str = "0.0.0.0";
    const PORT: u16 = 8080;
    const POOL_SIZE: u32 = 8;
    const MAX_POOL_SIZE: u32 = 64;
    const LOG_LEVEL: &str = "info";

    /// Environment variables consulted, highest precedence last.
    const ENV_KEYS: [&str; 6] = [
        "DATABASE_URL",
        "ANSWER_SERVICE_URL",
        "HOST",
        "PORT",
        "POOL_SIZE",
        "LOG_LEVEL",
    ];

    /// Loads the configuration from defaults, an optional TOML file and the
    /// environment. A value that cannot be parsed is an error; values that
    /// parse but are out of range fall back to their defaults.
    pub fn load(config_file: Option<&Path>) -> Result<Self, QaDeskError> {
        let config_path = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if config_file.is_some() && !config_path.exists() {
            eprintln!(
                "Config file {} does not exist - continuing with defaults and environment",
                config_path.display()
            );
        }

        let mut config = Self::extract(&config_path)?;
        config.ensure_valid();

        Ok(config)
    }

    /// Extraction without range checks.
    pub fn extract(config_path: &Path) -> Result<Self, QaDeskError> {
        Self::figment(config_path)
            .extract()
            .map_err(|e| QaDeskError::Config(Box::new(e)))
    }

    fn figment(config_path: &Path) -> Figment {
        // FLASK_URL is the legacy name for the answer service and loses to ANSWER_SERVICE_URL
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(
                Env::raw()
                    .only(&["FLASK_URL"])
                    .map(|_| "answer_service_url".into()),
            )
            .merge(Env::raw().only(&Self::ENV_KEYS))
    }

    /// Path of the SQLite database file, with any `sqlite://` scheme removed.
    pub fn database_path(&self) -> PathBuf {
        let raw = self.database_url.trim();
        let path = raw
            .strip_prefix("sqlite://")
            .or_else(|| raw.strip_prefix("sqlite:"))
            .unwrap_or(raw);
        PathBuf::from(path)
    }

    /// Base URL of the answer service without a trailing slash.
    pub fn answer_service_base(&self) -> &str {
        self.answer_service_url.trim_end_matches('/')
    }

    pub fn to_toml(&self) -> Result<String, QaDeskError> {
        toml::to_string_pretty(self)
            .map_err(|e| QaDeskError::Error(format!("Failed to serialize config: {}", e)))
    }

    fn ensure_valid(&mut self) {
        // Invalid values are reported and replaced by their defaults
        let str_original = self.log_level.clone();
        self.log_level = self.log_level.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.log_level.as_str()) {
            eprintln!(
                "Config error: log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::LOG_LEVEL
            );
            self.log_level = Self::LOG_LEVEL.to_owned();
        }

        if self.pool_size == 0 || self.pool_size > Self::MAX_POOL_SIZE {
            eprintln!(
                "Config error: pool size of {} is invalid - using default of {}",
                self.pool_size,
                Self::POOL_SIZE
            );
            self.pool_size = Self::POOL_SIZE;
        }

        if self.database_url.trim().is_empty() {
            eprintln!(
                "Config error: database url is empty - using default of '{}'",
                Self::DATABASE_URL
            );
            self.database_url = Self::DATABASE_URL.to_owned();
        }

        if self.answer_service_url.trim().is_empty() {
            eprintln!(
                "Config error: answer service url is empty - using default of '{}'",
                Self::ANSWER_SERVICE_URL
            );
            self.answer_service_url = Self::ANSWER_SERVICE_URL.to_owned();
        }
    }
}

//! Ingestion Configuration

use crate::IngestError;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use timeline::TimelineConfig;
use tracing::{info, Level};
use weather_cache::WeatherCacheConfig;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Maximum level: trace, debug, info, warn or error (default: info)
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl LoggingConfig {
    /// Parsed `level`
    pub fn max_level(&self) -> Result<Level, ConfigError> {
        self.level.parse::<Level>().map_err(|_| {
            ConfigError::Message(format!("logging.level: unknown level {:?}", self.level))
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level ingestion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub weather: WeatherCacheConfig,
    pub timeline: TimelineConfig,
    pub logging: LoggingConfig,
}

impl IngestConfig {
    /// Load from an optional config file, overridden by `TRIPS__*`
    /// environment variables (e.g. `TRIPS__WEATHER__RADIUS_MILES=5`).
    /// Missing keys keep their defaults; an unknown log level is an error.
    pub fn load(path: Option<&str>) -> Result<Self, IngestError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("TRIPS")
                .separator("__")
                .try_parsing(true),
        );

        let config: IngestConfig = builder.build()?.try_deserialize()?;
        config.logging.max_level()?;
        info!("Loaded ingest config: {:?}", config);
        Ok(config)
    }
}

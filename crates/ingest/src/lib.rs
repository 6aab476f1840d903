//! Telemetry Ingestion
//!
//! Entry point for dashcam telemetry. Validates incoming records, then feeds
//! them to trip consolidation one user at a time, derives weather conditions
//! from location samples and builds trip reports.

mod config;
mod error;
mod ingest;
mod validator;

pub use crate::config::{IngestConfig, LoggingConfig};
pub use error::{IngestError, ValidationError};
pub use ingest::TelemetryIngest;
pub use validator::{validate_condition, validate_event, validate_location, validate_window};

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the global tracing subscriber.
///
/// An unknown level falls back to info with a warning. Returns false if a
/// subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let parsed = config.max_level();
    let level = parsed.as_ref().copied().unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let installed = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish()).is_ok()
    } else {
        tracing::subscriber::set_global_default(builder.finish()).is_ok()
    };

    if installed {
        if let Err(e) = parsed {
            tracing::warn!("{}; using {}", e, level);
        }
        tracing::info!("Logging initialized at level {}", level);
    }
    installed
}

//! Ingestion Error Types

use storage::StorageError;
use thiserror::Error;
use timeline::SanitizeError;
use trip_consolidator::ConsolidationError;
use weather_cache::WeatherError;

/// Malformed input rejected before it reaches consolidation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Value out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must be finite, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("Time range starts at {start} after it ends at {end}")]
    InvalidTimeRange { start: i64, end: i64 },

    #[error("Event type is unknown")]
    UnknownEventType,

    /// Record belongs to another user than the one being ingested
    #[error("Record {id:?} belongs to user {actual:?}, expected {expected:?}")]
    UserMismatch {
        id: String,
        expected: String,
        actual: String,
    },
}

/// Ingestion error types
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Consolidation(#[from] ConsolidationError),

    #[error(transparent)]
    Timeline(#[from] SanitizeError),

    #[error("Weather error: {0}")]
    Weather(#[from] WeatherError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl IngestError {
    /// Rejected input; fix the request rather than retry it
    pub fn is_user_input(&self) -> bool {
        matches!(self, IngestError::Validation(_))
    }

    /// Stored data violates an invariant; needs an operator, not a retry
    pub fn is_bad_state(&self) -> bool {
        match self {
            IngestError::Consolidation(e) => e.is_bad_state(),
            IngestError::Timeline(e) => e.is_bad_state(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            IngestError::Consolidation(e) => e.is_not_found(),
            IngestError::Timeline(e) => e.is_not_found(),
            IngestError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }
}

//! Trip Timeline Reporting
//!
//! Turns the internal records of a trip into its external report:
//! events in chronological order, each with a playback link, and a
//! non-overlapping sequence of condition segments where every segment lists
//! all conditions active during it.

mod sanitizer;
mod sweep;

pub use sanitizer::TimelineSanitizer;
pub use sweep::{consolidate_conditions, ResolvedCondition};

use serde::{Deserialize, Serialize};
use storage::{ConditionType, EventType, StorageError};
use thiserror::Error;

/// Timeline error types
#[derive(Error, Debug)]
pub enum SanitizeError {
    /// Stored data violates an assumption of the report; not retryable
    #[error("Bad state: {0}")]
    BadState(String),

    #[error("Storage error while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: StorageError,
    },
}

impl SanitizeError {
    pub fn is_bad_state(&self) -> bool {
        matches!(self, SanitizeError::BadState(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SanitizeError::Storage { source, .. } if source.is_not_found())
    }
}

pub(crate) fn storage_err(
    context: impl Into<String>,
) -> impl FnOnce(StorageError) -> SanitizeError {
    let context = context.into();
    move |source| SanitizeError::Storage { context, source }
}

/// Timeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Source pointers followed before a chain is declared malformed (default: 10)
    pub max_source_hops: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self { max_source_hops: 10 }
    }
}

/// Where an external consumer can find the footage behind a fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalSourceType {
    DashcamVideo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSource {
    pub source_type: ExternalSourceType,
    pub video_url: String,
}

impl ExternalSource {
    pub fn dashcam_video(video_url: impl Into<String>) -> Self {
        Self {
            source_type: ExternalSourceType::DashcamVideo,
            video_url: video_url.into(),
        }
    }
}

/// Event as reported externally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub event_type: EventType,
    pub severity: f64,
    pub value: f64,
    pub timestamp_ms: i64,
    pub external_source: ExternalSource,
}

/// One segment of the flattened condition timeline.
///
/// `condition_type`, `severity` and `external_source` are parallel: entry `i`
/// of each describes the same active condition. Both ends are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrivingCondition {
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub condition_type: Vec<ConditionType>,
    pub severity: Vec<f64>,
    pub external_source: Vec<ExternalSource>,
}

/// Externally reported trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTrip {
    pub trip_id: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub events: Vec<ExternalEvent>,
    pub driving_conditions: Vec<DrivingCondition>,
}

//! Input Validation

use crate::ValidationError;
use storage::{DrivingConditionInternal, Event, EventType, RawLocation};

fn require_user(user_id: &str) -> Result<(), ValidationError> {
    if user_id.is_empty() {
        return Err(ValidationError::MissingField("user_id"));
    }
    Ok(())
}

fn require_timestamp(field: &'static str, timestamp_ms: i64) -> Result<(), ValidationError> {
    if timestamp_ms == 0 {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

fn require_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { field, value });
    }
    Ok(())
}

fn require_in_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    require_finite(field, value)?;
    if value < min || value > max {
        return Err(ValidationError::OutOfRange { field, value, min, max });
    }
    Ok(())
}

/// Check an event before consolidation
pub fn validate_event(event: &Event) -> Result<(), ValidationError> {
    require_user(&event.user_id)?;
    require_timestamp("timestamp_ms", event.timestamp_ms)?;
    if event.event_type == EventType::Unknown {
        return Err(ValidationError::UnknownEventType);
    }
    require_finite("severity", event.severity)?;
    require_finite("value", event.value)?;
    if event.source.source_id.is_empty() {
        return Err(ValidationError::MissingField("source_id"));
    }
    Ok(())
}

/// Check a driving condition before consolidation
pub fn validate_condition(condition: &DrivingConditionInternal) -> Result<(), ValidationError> {
    require_user(&condition.user_id)?;
    require_timestamp("start_time_ms", condition.start_time_ms)?;
    require_timestamp("end_time_ms", condition.end_time_ms)?;
    validate_window(condition.start_time_ms, condition.end_time_ms)?;
    require_finite("severity", condition.severity)?;
    if condition.source.source_id.is_empty() {
        return Err(ValidationError::MissingField("source_id"));
    }
    Ok(())
}

/// Check a location sample ingested for `user_id`
pub fn validate_location(user_id: &str, location: &RawLocation) -> Result<(), ValidationError> {
    require_user(user_id)?;
    if location.user_id != user_id {
        return Err(ValidationError::UserMismatch {
            id: location.id.clone(),
            expected: user_id.to_string(),
            actual: location.user_id.clone(),
        });
    }
    require_timestamp("timestamp_ms", location.timestamp_ms)?;
    require_in_range("lat", location.coordinate.lat, -90.0, 90.0)?;
    require_in_range("lon", location.coordinate.lon, -180.0, 180.0)?;
    Ok(())
}

/// Check a `[start_ms, end_ms]` query or condition window
pub fn validate_window(start_ms: i64, end_ms: i64) -> Result<(), ValidationError> {
    if start_ms > end_ms {
        return Err(ValidationError::InvalidTimeRange {
            start: start_ms,
            end: end_ms,
        });
    }
    Ok(())
}

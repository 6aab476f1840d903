//! Telemetry Record Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of point-in-time driving event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[default]
    Unknown,
    FastAcceleration,
    FastDeceleration,
    LaneChange,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Unknown => "UNKNOWN_EVENT_TYPE",
            EventType::FastAcceleration => "FAST_ACCELERATION",
            EventType::FastDeceleration => "FAST_DECELERATION",
            EventType::LaneChange => "LANE_CHANGE",
        };
        f.write_str(name)
    }
}

/// Environmental or contextual driving condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    /// Explicit "nothing notable"; never reported externally
    #[default]
    NoneConditionType,
    Snow,
    Rain,
    Hail,
    Sleet,
    Fog,
    FreezingRain,
    Night,
    Urban,
    CloseFollowingDistance,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConditionType::NoneConditionType => "NONE_CONDITION_TYPE",
            ConditionType::Snow => "SNOW",
            ConditionType::Rain => "RAIN",
            ConditionType::Hail => "HAIL",
            ConditionType::Sleet => "SLEET",
            ConditionType::Fog => "FOG",
            ConditionType::FreezingRain => "FREEZING_RAIN",
            ConditionType::Night => "NIGHT",
            ConditionType::Urban => "URBAN",
            ConditionType::CloseFollowingDistance => "CLOSE_FOLLOWING_DISTANCE",
        };
        f.write_str(name)
    }
}

/// Kind of raw record a [`Source`] points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceType {
    RawVideo,
    RawMotion,
    RawLocation,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceType::RawVideo => "RAW_VIDEO",
            SourceType::RawMotion => "RAW_MOTION",
            SourceType::RawLocation => "RAW_LOCATION",
        };
        f.write_str(name)
    }
}

/// Non-owning back-reference to the raw record that produced a fact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    pub source_type: SourceType,
    pub source_id: String,
}

impl Source {
    pub fn new(source_type: SourceType, source_id: impl Into<String>) -> Self {
        Self {
            source_type,
            source_id: source_id.into(),
        }
    }

    /// Cache key in the form `SOURCE_TYPE/SOURCE_ID`
    pub fn key(&self) -> String {
        format!("{}/{}", self.source_type, self.source_id)
    }
}

/// Decimal-degree coordinate (north and east positive)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}/{:.6}", self.lat, self.lon)
    }
}

/// Registered dashcam user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub create_time_ms: i64,
}

/// Non-overlapping window of driving activity for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub user_id: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
}

impl Trip {
    /// Create an unpersisted trip (empty id)
    pub fn new(user_id: impl Into<String>, start_time_ms: i64, end_time_ms: i64) -> Self {
        Self {
            id: String::new(),
            user_id: user_id.into(),
            start_time_ms,
            end_time_ms,
        }
    }
}

/// Point-in-time driving event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub user_id: String,
    pub trip_id: String,
    pub timestamp_ms: i64,
    pub event_type: EventType,
    pub severity: f64,
    pub value: f64,
    pub source: Source,
}

impl Event {
    /// Create an unpersisted event with zero severity and value
    pub fn new(
        user_id: impl Into<String>,
        timestamp_ms: i64,
        event_type: EventType,
        source: Source,
    ) -> Self {
        Self {
            id: String::new(),
            user_id: user_id.into(),
            trip_id: String::new(),
            timestamp_ms,
            event_type,
            severity: 0.0,
            value: 0.0,
            source,
        }
    }

    pub fn with_severity(mut self, severity: f64) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }
}

/// Time-ranged driving condition as stored internally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivingConditionInternal {
    pub id: String,
    pub user_id: String,
    pub trip_id: String,
    pub condition_type: ConditionType,
    pub severity: f64,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub source: Source,
}

impl DrivingConditionInternal {
    /// Create an unpersisted condition
    pub fn new(
        user_id: impl Into<String>,
        condition_type: ConditionType,
        severity: f64,
        start_time_ms: i64,
        end_time_ms: i64,
        source: Source,
    ) -> Self {
        Self {
            id: String::new(),
            user_id: user_id.into(),
            trip_id: String::new(),
            condition_type,
            severity,
            start_time_ms,
            end_time_ms,
            source,
        }
    }
}

/// Uploaded dashcam video; the terminal hop of every source chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVideo {
    pub id: String,
    pub user_id: String,
    pub create_time_ms: i64,
    pub duration_ms: i64,
    pub cloud_storage_file_name: String,
}

/// Motion sample (speed and acceleration)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMotion {
    pub id: String,
    pub user_id: String,
    pub timestamp_ms: i64,
    pub velocity_mph: f64,
    pub acceleration_mph_s: f64,
    pub source: Option<Source>,
}

/// GPS sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLocation {
    pub id: String,
    pub user_id: String,
    pub timestamp_ms: i64,
    pub coordinate: Coordinate,
    pub source: Option<Source>,
}

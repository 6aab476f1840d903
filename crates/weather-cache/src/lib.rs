//! Weather Cache
//!
//! Historical weather lookups with:
//! - Reuse of fetched reports for nearby coordinates
//! - Time-range indexing per location bucket
//! - Mapping of weather codes to driving conditions

mod cache;
mod conditions;
#[cfg(test)]
mod fake;

pub use cache::WeatherCache;
pub use conditions::{condition_for_weather_code, WeatherConditionGenerator};

use chrono::{DateTime, Utc};
use range_map::RangeMapError;
use serde::{Deserialize, Serialize};
use storage::Coordinate;
use thiserror::Error;

/// Weather error types
#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("Weather service error: {0}")]
    Service(String),

    #[error("Weather service returned no conditions for {coordinate} at {timestamp}")]
    EmptyResponse {
        timestamp: DateTime<Utc>,
        coordinate: Coordinate,
    },

    #[error("Cache error: {0}")]
    Cache(#[from] RangeMapError),

    #[error(
        "Lookup for {coordinate} at {timestamp} gave up after {calls} calls; \
         fetched reports never cover it"
    )]
    CallLimit {
        timestamp: DateTime<Utc>,
        coordinate: Coordinate,
        calls: usize,
    },

    #[error("Unknown weather code {0}")]
    UnknownCode(i32),

    #[error("Timestamp {0} ms is out of range")]
    InvalidTimestamp(i64),
}

/// Provider of a weather report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeatherSource {
    WeatherStack,
    Fake,
}

/// Weather report covering `[start_time, end_time)` around a coordinate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub weather_code: i32,
    pub coordinate: Coordinate,
    pub source: WeatherSource,
}

/// External historical weather lookup
pub trait WeatherService {
    /// Reports around `timestamp` at `coordinate`, in any order
    fn get_historical_weather(
        &self,
        timestamp: DateTime<Utc>,
        coordinate: Coordinate,
    ) -> Result<Vec<WeatherCondition>, WeatherError>;
}

/// Which cached bucket serves a query when several are in radius
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProximityMatch {
    /// First bucket in creation order
    First,
    /// Closest bucket
    #[default]
    Nearest,
}

/// Weather cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherCacheConfig {
    /// Reports are reused below this rounded distance (default: 3)
    pub radius_miles: u32,
    /// Bucket selection policy
    pub proximity: ProximityMatch,
    /// Fetch attempts per lookup before giving up (default: 10000)
    pub max_lookup_calls: usize,
}

impl Default for WeatherCacheConfig {
    fn default() -> Self {
        Self {
            radius_miles: 3,
            proximity: ProximityMatch::Nearest,
            max_lookup_calls: 10_000,
        }
    }
}

/// Great-circle distance in statute miles (spherical law of cosines)
pub fn distance_miles(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let theta = (a.lon - b.lon).to_radians();

    let cos_angle = lat_a.sin() * lat_b.sin() + lat_a.cos() * lat_b.cos() * theta.cos();
    let angle = cos_angle.clamp(-1.0, 1.0).acos().to_degrees();

    // 60 nautical miles per degree
    angle * 60.0 * 1.1515
}

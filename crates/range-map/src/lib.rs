//! Half-Open Interval Map
//!
//! Maps non-overlapping `[lower, upper)` ranges to values with O(log n)
//! point lookup. Used directly and as the time index of the weather cache.

mod map;

pub use map::RangeMap;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Half-open range `[lower, upper)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub lower: i64,
    pub upper: i64,
}

impl Range {
    /// Create a new range
    pub fn new(lower: i64, upper: i64) -> Self {
        Self { lower, upper }
    }

    /// Whether `point` lies inside the range (lower inclusive, upper exclusive)
    pub fn contains(&self, point: i64) -> bool {
        point >= self.lower && point < self.upper
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lower, self.upper)
    }
}

/// Range map errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeMapError {
    #[error("range {new} lower bound falls inside existing range {existing}")]
    LowerBoundOverlap { new: Range, existing: Range },

    #[error("range {new} upper bound overlaps existing range {existing}")]
    UpperBoundOverlap { new: Range, existing: Range },

    #[error("range {0} is empty or inverted")]
    InvalidRange(Range),

    #[error("keys length {keys} not equal to values length {values}")]
    LengthMismatch { keys: usize, values: usize },
}

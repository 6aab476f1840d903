//! Range Map Implementation

use crate::{Range, RangeMapError};
use std::fmt;

/// Sorted map from non-overlapping half-open ranges to values.
///
/// Keys and values are kept in parallel vectors ordered by `lower`.
/// Insertion shifts the tail, which is fine for the tens-to-hundreds of
/// entries a cache bucket holds.
#[derive(Debug, Clone)]
pub struct RangeMap<V> {
    keys: Vec<Range>,
    values: Vec<V>,
}

impl<V> RangeMap<V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build a map from parallel key/value lists, inserting in the given order
    pub fn from_entries(keys: Vec<Range>, values: Vec<V>) -> Result<Self, RangeMapError> {
        if keys.len() != values.len() {
            return Err(RangeMapError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }

        let mut map = Self::new();
        for (range, value) in keys.into_iter().zip(values) {
            map.insert(range, value)?;
        }
        Ok(map)
    }

    /// Number of stored ranges
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Index of the first stored range whose lower bound is greater than `point`
    fn upper_index(&self, point: i64) -> usize {
        self.keys.partition_point(|r| r.lower <= point)
    }

    /// Look up the value whose range contains `point`
    pub fn get(&self, point: i64) -> Option<&V> {
        let idx = self.upper_index(point);
        if idx == 0 {
            return None;
        }
        if self.keys[idx - 1].contains(point) {
            Some(&self.values[idx - 1])
        } else {
            None
        }
    }

    /// Insert a range, replacing the value if the exact range already exists.
    ///
    /// Fails without modifying the map if the range overlaps a neighbour.
    pub fn insert(&mut self, range: Range, value: V) -> Result<(), RangeMapError> {
        if range.lower >= range.upper {
            return Err(RangeMapError::InvalidRange(range));
        }

        let idx = self.upper_index(range.lower);

        if idx > 0 {
            let prev = self.keys[idx - 1];
            if prev == range {
                self.values[idx - 1] = value;
                return Ok(());
            }
            if range.lower < prev.upper {
                return Err(RangeMapError::LowerBoundOverlap {
                    new: range,
                    existing: prev,
                });
            }
        }

        if let Some(next) = self.keys.get(idx) {
            if range.upper > next.lower {
                return Err(RangeMapError::UpperBoundOverlap {
                    new: range,
                    existing: *next,
                });
            }
        }

        self.keys.insert(idx, range);
        self.values.insert(idx, value);
        Ok(())
    }

    /// Stored ranges in ascending order
    pub fn ranges(&self) -> &[Range] {
        &self.keys
    }
}

impl<V> Default for RangeMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Display for RangeMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for range in &self.keys {
            write!(f, "({}, _) ", range)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_map() -> RangeMap<&'static str> {
        RangeMap::from_entries(
            vec![
                Range::new(-30, -20),
                Range::new(-20, -10),
                Range::new(-10, 0),
                Range::new(0, 10),
                Range::new(20, 30),
            ],
            vec!["one", "two", "three", "four", "six"],
        )
        .unwrap()
    }

    #[test]
    fn test_get_and_fill_gap() {
        let mut map = sample_map();
        assert_eq!(map.get(5), Some(&"four"));
        assert_eq!(map.get(15), None);

        map.insert(Range::new(10, 20), "five").unwrap();
        assert_eq!(map.get(15), Some(&"five"));

        map.insert(Range::new(30, 40), "seven").unwrap();
        assert_eq!(map.get(35), Some(&"seven"));
        assert_eq!(map.len(), 7);
    }

    #[test]
    fn test_half_open_boundaries() {
        let map = sample_map();
        // Lower bound is contained, upper bound belongs to the next range
        assert_eq!(map.get(-30), Some(&"one"));
        assert_eq!(map.get(-20), Some(&"two"));
        assert_eq!(map.get(0), Some(&"four"));
        // Upper bound with no adjacent range is a gap
        assert_eq!(map.get(10), None);
        assert_eq!(map.get(30), None);
        assert_eq!(map.get(-31), None);
    }

    #[test]
    fn test_exact_range_replaces_value() {
        let mut map = sample_map();
        map.insert(Range::new(0, 10), "FOUR").unwrap();
        assert_eq!(map.len(), 5);
        assert_eq!(map.get(3), Some(&"FOUR"));
    }

    #[test]
    fn test_overlap_rejected() {
        let mut map = sample_map();

        let err = map.insert(Range::new(5, 15), "bad").unwrap_err();
        assert!(matches!(err, RangeMapError::LowerBoundOverlap { .. }));

        let err = map.insert(Range::new(15, 25), "bad").unwrap_err();
        assert!(matches!(err, RangeMapError::UpperBoundOverlap { .. }));

        // Same lower bound, different upper bound
        let err = map.insert(Range::new(0, 5), "bad").unwrap_err();
        assert!(matches!(err, RangeMapError::LowerBoundOverlap { .. }));

        // Covers an existing range entirely
        let err = map.insert(Range::new(-40, 40), "bad").unwrap_err();
        assert!(matches!(err, RangeMapError::UpperBoundOverlap { .. }));

        assert_eq!(map.len(), 5);
        assert_eq!(map.get(12), None);
    }

    #[test]
    fn test_empty_range_rejected() {
        let mut map: RangeMap<u8> = RangeMap::new();
        assert_eq!(
            map.insert(Range::new(4, 4), 1),
            Err(RangeMapError::InvalidRange(Range::new(4, 4)))
        );
        assert!(map.is_empty());
    }

    #[test]
    fn test_length_mismatch() {
        let result = RangeMap::from_entries(vec![Range::new(0, 1)], Vec::<u8>::new());
        assert!(matches!(result, Err(RangeMapError::LengthMismatch { .. })));
    }

    #[test]
    fn test_display() {
        let map = RangeMap::from_entries(vec![Range::new(0, 10)], vec![1]).unwrap();
        assert_eq!(map.to_string(), "{ ([0, 10), _) }");
    }

    proptest! {
        #[test]
        fn prop_any_insert_order_finds_every_point(
            order in Just((0..40i64).collect::<Vec<_>>()).prop_shuffle(),
            reinsert in Just((0..40i64).collect::<Vec<_>>()).prop_shuffle(),
        ) {
            // Contiguous ranges of width 10 from -200 to 200
            let mut map = RangeMap::new();
            for i in order {
                let lower = -200 + i * 10;
                map.insert(Range::new(lower, lower + 10), lower).unwrap();
            }
            for i in reinsert {
                let lower = -200 + i * 10;
                map.insert(Range::new(lower, lower + 10), lower).unwrap();
            }
            prop_assert_eq!(map.len(), 40);

            for point in -200..200i64 {
                let expected = point.div_euclid(10) * 10;
                prop_assert_eq!(map.get(point), Some(&expected));
            }
            prop_assert_eq!(map.get(200), None);
            prop_assert_eq!(map.get(-201), None);
        }

        #[test]
        fn prop_gaps_are_not_found(
            order in Just((0..20i64).collect::<Vec<_>>()).prop_shuffle(),
        ) {
            // Ranges [20i, 20i + 10) leave a gap [20i + 10, 20i + 20)
            let mut map = RangeMap::new();
            for i in order {
                map.insert(Range::new(i * 20, i * 20 + 10), i).unwrap();
            }
            for i in 0..20i64 {
                for offset in 0..10 {
                    prop_assert_eq!(map.get(i * 20 + offset), Some(&i));
                    prop_assert_eq!(map.get(i * 20 + 10 + offset), None);
                }
            }
        }

        #[test]
        fn prop_overlapping_insert_leaves_map_unchanged(
            lower in -50i64..150,
            width in 1i64..60,
        ) {
            let mut map = RangeMap::new();
            for i in 0..10i64 {
                map.insert(Range::new(i * 10, i * 10 + 10), i).unwrap();
            }
            let before: Vec<Range> = map.ranges().to_vec();

            let candidate = Range::new(lower, lower + width);
            let overlaps = before
                .iter()
                .any(|r| candidate.lower < r.upper && r.lower < candidate.upper);
            let is_exact = before.contains(&candidate);

            let result = map.insert(candidate, -1);
            if overlaps && !is_exact {
                prop_assert!(result.is_err());
                prop_assert_eq!(map.ranges(), before.as_slice());
            } else {
                prop_assert!(result.is_ok());
            }
        }
    }
}

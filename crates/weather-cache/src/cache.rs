//! Weather Cache Implementation

use crate::{
    distance_miles, ProximityMatch, WeatherCacheConfig, WeatherCondition, WeatherError,
    WeatherService,
};
use chrono::{DateTime, Utc};
use range_map::{Range, RangeMap};
use storage::Coordinate;
use tracing::{debug, info};

/// Reports fetched for one anchor coordinate
struct Bucket {
    /// Anchor coordinate rendered as `lat/lon`
    key: String,
    anchor: Coordinate,
    reports: RangeMap<WeatherCondition>,
}

/// Caches weather reports by location and time.
///
/// A report fetched for one coordinate also answers queries within
/// `radius_miles` of it. Not synchronized; share behind a lock.
pub struct WeatherCache<W> {
    service: W,
    config: WeatherCacheConfig,
    /// In creation order
    buckets: Vec<Bucket>,
}

impl<W: WeatherService> WeatherCache<W> {
    pub fn new(service: W, config: WeatherCacheConfig) -> Self {
        info!("Creating weather cache with config: {:?}", config);
        Self {
            service,
            config,
            buckets: Vec::new(),
        }
    }

    /// Wrapped weather service
    pub fn service(&self) -> &W {
        &self.service
    }

    /// Number of location buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Weather at `coordinate` and `timestamp`, fetching on a miss.
    ///
    /// The returned report carries the query coordinate, not the anchor of
    /// the bucket that served it.
    pub fn lookup(
        &mut self,
        timestamp: DateTime<Utc>,
        coordinate: Coordinate,
    ) -> Result<WeatherCondition, WeatherError> {
        let point = timestamp.timestamp_millis();

        for _ in 0..self.config.max_lookup_calls {
            let bucket = self.find_bucket(coordinate);

            if let Some(idx) = bucket {
                if let Some(report) = self.buckets[idx].reports.get(point) {
                    metrics::counter!("weather_cache_hits_total").increment(1);
                    debug!(
                        "Weather cache hit for {} at {} (bucket {})",
                        coordinate, timestamp, self.buckets[idx].key
                    );
                    let mut report = report.clone();
                    report.coordinate = coordinate;
                    return Ok(report);
                }
            }

            debug!("Weather cache miss for {} at {}, fetching", coordinate, timestamp);
            metrics::counter!("weather_cache_fetches_total").increment(1);
            let mut reports = self.service.get_historical_weather(timestamp, coordinate)?;
            if reports.is_empty() {
                return Err(WeatherError::EmptyResponse { timestamp, coordinate });
            }
            reports.sort_by_key(|r| r.start_time);

            // Fill a scratch copy so a rejected report leaves the cache as it was
            let mut filled = match bucket {
                Some(idx) => self.buckets[idx].reports.clone(),
                None => RangeMap::new(),
            };
            for report in reports {
                let range = Range::new(
                    report.start_time.timestamp_millis(),
                    report.end_time.timestamp_millis(),
                );
                filled.insert(range, report)?;
            }

            match bucket {
                Some(idx) => {
                    debug!(
                        "Weather bucket {} now holds {} reports",
                        self.buckets[idx].key,
                        filled.len()
                    );
                    self.buckets[idx].reports = filled;
                }
                None => self.create_bucket(coordinate, filled),
            }
        }

        Err(WeatherError::CallLimit {
            timestamp,
            coordinate,
            calls: self.config.max_lookup_calls,
        })
    }

    /// Bucket serving `coordinate`: one in radius per the proximity policy,
    /// else one anchored at exactly this coordinate
    fn find_bucket(&self, coordinate: Coordinate) -> Option<usize> {
        let radius = f64::from(self.config.radius_miles);
        let mut in_radius = self
            .buckets
            .iter()
            .enumerate()
            .map(|(idx, bucket)| (idx, distance_miles(coordinate, bucket.anchor)))
            .filter(|(_, distance)| distance.round() < radius);

        let found = match self.config.proximity {
            ProximityMatch::First => in_radius.next(),
            ProximityMatch::Nearest => in_radius.min_by(|a, b| a.1.total_cmp(&b.1)),
        };

        found.map(|(idx, _)| idx).or_else(|| {
            let key = coordinate.to_string();
            self.buckets.iter().position(|bucket| bucket.key == key)
        })
    }

    fn create_bucket(&mut self, anchor: Coordinate, reports: RangeMap<WeatherCondition>) {
        let key = anchor.to_string();
        debug!("Creating weather bucket {} with {} reports", key, reports.len());
        self.buckets.push(Bucket {
            key,
            anchor,
            reports,
        });
    }
}

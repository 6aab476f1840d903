//! Weather-Derived Driving Conditions

use crate::{WeatherCache, WeatherError, WeatherService};
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;
use storage::{ConditionType, DrivingConditionInternal, RawLocation, Source, SourceType};
use tracing::debug;

/// Samples further apart than this start a new condition
const MAX_SAMPLE_GAP_MS: i64 = 60 * 60 * 1000;

/// Map a weather service code to a condition and its severity (0-100).
///
/// Clear and cloudy codes map to NONE; unrecognized codes to `None`.
pub fn condition_for_weather_code(code: i32) -> Option<(ConditionType, f64)> {
    use ConditionType::*;

    let mapped = match code {
        230 => (Snow, 100.0),
        338 => (Snow, 80.0),
        227 => (Snow, 70.0),
        335 => (Snow, 60.0),
        395 => (Snow, 55.0),
        332 => (Snow, 50.0),
        371 => (Snow, 45.0),
        329 => (Snow, 40.0),
        326 => (Snow, 30.0),
        368 => (Snow, 20.0),
        323 | 392 => (Snow, 10.0),
        179 => (Snow, 0.0),

        359 => (Rain, 100.0),
        308 => (Rain, 80.0),
        305 => (Rain, 70.0),
        389 | 356 => (Rain, 60.0),
        302 => (Rain, 50.0),
        299 => (Rain, 40.0),
        296 => (Rain, 30.0),
        386 | 293 => (Rain, 20.0),
        353 => (Rain, 15.0),
        266 => (Rain, 10.0),
        263 => (Rain, 5.0),
        176 => (Rain, 0.0),

        350 => (Hail, 100.0),
        377 => (Hail, 60.0),
        374 => (Hail, 30.0),

        320 => (Sleet, 75.0),
        365 => (Sleet, 60.0),
        317 => (Sleet, 45.0),
        362 => (Sleet, 30.0),
        182 => (Sleet, 0.0),

        248 => (Fog, 70.0),
        143 => (Fog, 30.0),

        314 => (FreezingRain, 100.0),
        311 => (FreezingRain, 80.0),
        284 => (FreezingRain, 60.0),
        260 => (FreezingRain, 40.0),
        281 => (FreezingRain, 20.0),
        185 => (FreezingRain, 0.0),

        200 | 122 | 119 | 116 | 113 => (NoneConditionType, 0.0),
        _ => return None,
    };
    Some(mapped)
}

/// Turns location samples into weather driving conditions
pub struct WeatherConditionGenerator<W> {
    cache: WeatherCache<W>,
}

impl<W: WeatherService> WeatherConditionGenerator<W> {
    pub fn new(cache: WeatherCache<W>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &WeatherCache<W> {
        &self.cache
    }

    /// Look up the weather at every sample and emit one condition per run of
    /// samples sharing a condition and severity, splitting runs at gaps
    /// longer than an hour.
    ///
    /// Each condition spans its first to last sample and points at the first
    /// sample as its source. Samples must already be persisted.
    pub fn generate(
        &mut self,
        user_id: &str,
        locations: &[RawLocation],
    ) -> Result<Vec<DrivingConditionInternal>, WeatherError> {
        // Severity is keyed by its bits; all mapped severities are non-negative
        let mut groups: BTreeMap<(ConditionType, u64), Vec<&RawLocation>> = BTreeMap::new();

        for location in locations {
            let timestamp = Utc
                .timestamp_millis_opt(location.timestamp_ms)
                .single()
                .ok_or(WeatherError::InvalidTimestamp(location.timestamp_ms))?;
            let report = self.cache.lookup(timestamp, location.coordinate)?;
            let (condition_type, severity) = condition_for_weather_code(report.weather_code)
                .ok_or(WeatherError::UnknownCode(report.weather_code))?;

            groups
                .entry((condition_type, severity.to_bits()))
                .or_default()
                .push(location);
        }

        let mut conditions = Vec::new();
        for ((condition_type, severity_bits), mut samples) in groups {
            samples.sort_by_key(|l| l.timestamp_ms);
            let severity = f64::from_bits(severity_bits);

            let mut runs: Vec<(&RawLocation, &RawLocation)> = Vec::new();
            for sample in samples {
                match runs.last_mut() {
                    Some((_, last))
                        if sample.timestamp_ms - last.timestamp_ms <= MAX_SAMPLE_GAP_MS =>
                    {
                        *last = sample;
                    }
                    _ => runs.push((sample, sample)),
                }
            }

            for (first, last) in runs {
                conditions.push(DrivingConditionInternal::new(
                    user_id,
                    condition_type,
                    severity,
                    first.timestamp_ms,
                    last.timestamp_ms,
                    Source::new(SourceType::RawLocation, first.id.clone()),
                ));
            }
        }

        conditions.sort_by_key(|c| (c.start_time_ms, c.condition_type));
        debug!(
            "Generated {} weather conditions from {} location samples for user {}",
            conditions.len(),
            locations.len(),
            user_id
        );
        Ok(conditions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeWeatherService;
    use crate::WeatherCacheConfig;
    use chrono::{DateTime, Timelike};
    use storage::Coordinate;

    const MINUTE: i64 = 60_000;
    const HOUR: i64 = 60 * MINUTE;
    // 2021-03-01T00:00:00Z
    const DAY_START: i64 = 1_614_556_800_000;

    fn sample(id: &str, offset_ms: i64) -> RawLocation {
        RawLocation {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            timestamp_ms: DAY_START + offset_ms,
            coordinate: Coordinate::new(40.0, -75.0),
            source: None,
        }
    }

    fn generator(
        code_at: impl Fn(DateTime<Utc>) -> i32 + Send + Sync + 'static,
    ) -> WeatherConditionGenerator<FakeWeatherService> {
        let cache = WeatherCache::new(
            FakeWeatherService::with_codes(code_at),
            WeatherCacheConfig::default(),
        );
        WeatherConditionGenerator::new(cache)
    }

    #[test]
    fn test_weather_code_table() {
        assert_eq!(condition_for_weather_code(230), Some((ConditionType::Snow, 100.0)));
        assert_eq!(condition_for_weather_code(392), Some((ConditionType::Snow, 10.0)));
        assert_eq!(condition_for_weather_code(263), Some((ConditionType::Rain, 5.0)));
        assert_eq!(condition_for_weather_code(377), Some((ConditionType::Hail, 60.0)));
        assert_eq!(condition_for_weather_code(320), Some((ConditionType::Sleet, 75.0)));
        assert_eq!(condition_for_weather_code(248), Some((ConditionType::Fog, 70.0)));
        assert_eq!(condition_for_weather_code(284), Some((ConditionType::FreezingRain, 60.0)));
        assert_eq!(condition_for_weather_code(113), Some((ConditionType::NoneConditionType, 0.0)));
        assert_eq!(condition_for_weather_code(999), None);
    }

    #[test]
    fn test_samples_group_into_runs() {
        // Snow in the morning, clear from 06:00
        let mut generator = generator(|t| if t.hour() < 6 { 338 } else { 113 });
        let locations = vec![
            sample("a", 10 * MINUTE),
            sample("b", 40 * MINUTE),
            sample("c", 90 * MINUTE),
            // More than an hour after "c"
            sample("d", 4 * HOUR),
            sample("e", 7 * HOUR),
        ];

        let conditions = generator.generate("user-1", &locations).unwrap();
        assert_eq!(conditions.len(), 3);

        let first = &conditions[0];
        assert_eq!(first.condition_type, ConditionType::Snow);
        assert_eq!(first.severity, 80.0);
        assert_eq!(first.start_time_ms, DAY_START + 10 * MINUTE);
        assert_eq!(first.end_time_ms, DAY_START + 90 * MINUTE);
        assert_eq!(first.source, Source::new(SourceType::RawLocation, "a"));
        assert_eq!(first.user_id, "user-1");

        assert_eq!(conditions[1].start_time_ms, DAY_START + 4 * HOUR);
        assert_eq!(conditions[1].end_time_ms, DAY_START + 4 * HOUR);
        assert_eq!(conditions[2].condition_type, ConditionType::NoneConditionType);

        // One day fetched once
        assert_eq!(generator.cache().service().calls(), 1);
    }

    #[test]
    fn test_unordered_samples() {
        let mut generator = generator(|_| 296);
        let locations = vec![
            sample("late", 50 * MINUTE),
            sample("early", 0),
            sample("mid", 20 * MINUTE),
        ];

        let conditions = generator.generate("user-1", &locations).unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].source.source_id, "early");
        assert_eq!(conditions[0].end_time_ms, DAY_START + 50 * MINUTE);
    }

    #[test]
    fn test_unknown_code_is_error() {
        let mut generator = generator(|_| 1);
        let err = generator.generate("user-1", &[sample("a", 0)]).unwrap_err();
        assert!(matches!(err, WeatherError::UnknownCode(1)));
    }

    #[test]
    fn test_no_samples() {
        let mut generator = generator(|_| 113);
        assert!(generator.generate("user-1", &[]).unwrap().is_empty());
        assert_eq!(generator.cache().service().calls(), 0);
    }
}

//! In-process weather service for tests

use crate::{WeatherCondition, WeatherError, WeatherService, WeatherSource};
use chrono::{DateTime, Duration, DurationRound, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use storage::Coordinate;

enum Mode {
    /// Hourly reports for the UTC day of the request
    Day,
    /// Hourly reports for the day before the request
    DayBehind,
    Empty,
    Failing,
    /// Two overlapping reports for requests at or after the cutoff,
    /// hourly reports before it
    OverlappingFrom(DateTime<Utc>),
}

/// Fake service returning a day of hourly reports; the code is chosen per
/// report start time
pub(crate) struct FakeWeatherService {
    code_at: Box<dyn Fn(DateTime<Utc>) -> i32 + Send + Sync>,
    mode: Mode,
    calls: AtomicUsize,
}

impl FakeWeatherService {
    pub(crate) fn constant(code: i32) -> Self {
        Self::with_codes(move |_| code)
    }

    pub(crate) fn with_codes(
        code_at: impl Fn(DateTime<Utc>) -> i32 + Send + Sync + 'static,
    ) -> Self {
        Self {
            code_at: Box::new(code_at),
            mode: Mode::Day,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn day_behind(mut self) -> Self {
        self.mode = Mode::DayBehind;
        self
    }

    pub(crate) fn empty() -> Self {
        let mut fake = Self::constant(113);
        fake.mode = Mode::Empty;
        fake
    }

    pub(crate) fn failing() -> Self {
        let mut fake = Self::constant(113);
        fake.mode = Mode::Failing;
        fake
    }

    pub(crate) fn overlapping() -> Self {
        Self::constant(113).overlapping_after(DateTime::<Utc>::MIN_UTC)
    }

    pub(crate) fn overlapping_after(mut self, cutoff: DateTime<Utc>) -> Self {
        self.mode = Mode::OverlappingFrom(cutoff);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl WeatherService for FakeWeatherService {
    fn get_historical_weather(
        &self,
        timestamp: DateTime<Utc>,
        coordinate: Coordinate,
    ) -> Result<Vec<WeatherCondition>, WeatherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let day = timestamp
            .duration_trunc(Duration::days(1))
            .map_err(|e| WeatherError::Service(e.to_string()))?;
        let day = match self.mode {
            Mode::Day => day,
            Mode::DayBehind => day - Duration::days(1),
            Mode::Empty => return Ok(Vec::new()),
            Mode::Failing => {
                return Err(WeatherError::Service("connection refused".to_string()))
            }
            Mode::OverlappingFrom(cutoff) if timestamp >= cutoff => {
                let report = |start_time: DateTime<Utc>| WeatherCondition {
                    start_time,
                    end_time: start_time + Duration::hours(1),
                    weather_code: (self.code_at)(start_time),
                    coordinate,
                    source: WeatherSource::Fake,
                };
                return Ok(vec![report(day), report(day + Duration::minutes(30))]);
            }
            Mode::OverlappingFrom(_) => day,
        };

        // Newest first, so callers must sort
        Ok((0..24)
            .rev()
            .map(|hour| {
                let start_time = day + Duration::hours(hour);
                WeatherCondition {
                    start_time,
                    end_time: start_time + Duration::hours(1),
                    weather_code: (self.code_at)(start_time),
                    coordinate,
                    source: WeatherSource::Fake,
                }
            })
            .collect())
    }
}

//! Telemetry Ingest Implementation

use crate::validator::{validate_condition, validate_event, validate_location, validate_window};
use crate::{IngestConfig, IngestError, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use storage::{DrivingConditionInternal, Event, RawLocation, RecordStore, RecordStoreExt};
use timeline::{ExternalTrip, TimelineConfig, TimelineSanitizer};
use tokio::sync::Mutex;
use tracing::{debug, info};
use trip_consolidator::TripConsolidator;
use weather_cache::{WeatherCache, WeatherConditionGenerator, WeatherService};

/// Serializes consolidation per user over a shared record store.
///
/// Record store and weather service calls run inline on the calling task
/// while the user's lock is held. Both collaborators are synchronous; a
/// network-backed one should be driven from `tokio::task::spawn_blocking`
/// or a dedicated runtime by the caller.
pub struct TelemetryIngest<S: ?Sized, W> {
    store: Arc<S>,
    consolidator: TripConsolidator<S>,
    weather: Mutex<WeatherConditionGenerator<W>>,
    timeline_config: TimelineConfig,
    /// One lock per user id; held for the whole of each consolidation.
    /// Entries are dropped once no task holds or waits on them.
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S, W> TelemetryIngest<S, W>
where
    S: RecordStore + ?Sized,
    W: WeatherService,
{
    pub fn new(store: Arc<S>, weather_service: W, config: &IngestConfig) -> Self {
        info!("Creating telemetry ingest");
        let cache = WeatherCache::new(weather_service, config.weather.clone());
        Self {
            consolidator: TripConsolidator::new(Arc::clone(&store)),
            store,
            weather: Mutex::new(WeatherConditionGenerator::new(cache)),
            timeline_config: config.timeline.clone(),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    /// Forget the user's lock if nobody else holds a handle to it
    async fn release_user_lock(&self, user_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.user_locks.lock().await;
        if locks.get(user_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(user_id);
        }
    }

    /// Validate and consolidate an event
    pub async fn record_event(&self, event: Event) -> Result<Event, IngestError> {
        validate_event(&event)?;

        let user_id = event.user_id.clone();
        let lock = self.user_lock(&user_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.consolidator.record_event(event)
        };
        self.release_user_lock(&user_id, lock).await;
        let event = result?;

        metrics::counter!("ingest_events_recorded_total").increment(1);
        Ok(event)
    }

    /// Validate and consolidate a driving condition
    pub async fn record_condition(
        &self,
        condition: DrivingConditionInternal,
    ) -> Result<DrivingConditionInternal, IngestError> {
        validate_condition(&condition)?;

        let user_id = condition.user_id.clone();
        let lock = self.user_lock(&user_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.consolidator.record_condition(condition)
        };
        self.release_user_lock(&user_id, lock).await;
        let condition = result?;

        metrics::counter!("ingest_conditions_recorded_total").increment(1);
        Ok(condition)
    }

    /// Store location samples and consolidate the weather conditions they
    /// imply. Returns the recorded conditions.
    pub async fn record_locations(
        &self,
        user_id: &str,
        locations: Vec<RawLocation>,
    ) -> Result<Vec<DrivingConditionInternal>, IngestError> {
        for location in &locations {
            validate_location(user_id, location)?;
        }

        let lock = self.user_lock(user_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.consolidate_locations(user_id, locations).await
        };
        self.release_user_lock(user_id, lock).await;
        let recorded = result?;

        metrics::counter!("ingest_conditions_recorded_total").increment(recorded.len() as u64);
        Ok(recorded)
    }

    async fn consolidate_locations(
        &self,
        user_id: &str,
        locations: Vec<RawLocation>,
    ) -> Result<Vec<DrivingConditionInternal>, IngestError> {
        let mut stored = Vec::with_capacity(locations.len());
        for location in locations {
            stored.push(self.store.persist_new(location)?);
        }

        let conditions = self.weather.lock().await.generate(user_id, &stored)?;
        debug!(
            "{} location samples for user {} produced {} weather conditions",
            stored.len(),
            user_id,
            conditions.len()
        );

        let mut recorded = Vec::with_capacity(conditions.len());
        for condition in conditions {
            recorded.push(self.consolidator.record_condition(condition)?);
        }
        Ok(recorded)
    }

    /// Reports of the user's trips overlapping `[start_ms, end_ms]`
    pub async fn report_trips(
        &self,
        user_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<ExternalTrip>, IngestError> {
        if user_id.is_empty() {
            return Err(ValidationError::MissingField("user_id").into());
        }
        validate_window(start_ms, end_ms)?;

        let lock = self.user_lock(user_id).await;
        let result = {
            let _guard = lock.lock().await;
            let mut sanitizer =
                TimelineSanitizer::new(Arc::clone(&self.store), self.timeline_config.clone());
            sanitizer.list_trips(user_id, start_ms, end_ms)
        };
        self.release_user_lock(user_id, lock).await;
        Ok(result?)
    }
}

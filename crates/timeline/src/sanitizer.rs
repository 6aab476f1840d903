//! Timeline Sanitizer Implementation

use crate::sweep::{consolidate_conditions, ResolvedCondition};
use crate::{
    storage_err, ExternalEvent, ExternalSource, ExternalTrip, SanitizeError, TimelineConfig,
};
use std::collections::HashMap;
use std::sync::Arc;
use storage::{
    DrivingConditionInternal, Event, EventType, Field, Operator, Predicate, RawLocation,
    RawMotion, RawVideo, RecordStore, RecordStoreExt, Source, SourceType, Trip,
};
use tracing::{debug, info};

/// Builds external trip reports from stored records.
///
/// Resolved video links are cached for the lifetime of the sanitizer, keyed
/// by `SOURCE_TYPE/SOURCE_ID`.
pub struct TimelineSanitizer<S: ?Sized> {
    store: Arc<S>,
    config: TimelineConfig,
    video_links: HashMap<String, String>,
}

impl<S: RecordStore + ?Sized> TimelineSanitizer<S> {
    pub fn new(store: Arc<S>, config: TimelineConfig) -> Self {
        debug!("Creating timeline sanitizer with config: {:?}", config);
        Self {
            store,
            config,
            video_links: HashMap::new(),
        }
    }

    /// Number of cached source links
    pub fn cached_links(&self) -> usize {
        self.video_links.len()
    }

    /// Follow a source chain to the video it ultimately came from.
    ///
    /// Every source visited on the way is cached against the final link.
    pub fn find_video_link(&mut self, source: &Source) -> Result<String, SanitizeError> {
        let mut visited: Vec<String> = Vec::new();
        let mut current = source.clone();

        for _ in 0..self.config.max_source_hops {
            let key = current.key();
            if let Some(url) = self.video_links.get(&key).cloned() {
                self.remember(visited, &url);
                return Ok(url);
            }
            visited.push(key);

            let next = match current.source_type {
                SourceType::RawVideo => {
                    let video: RawVideo = self.store.fetch(&current.source_id).map_err(
                        storage_err(format!("getting raw video {:?}", current.source_id)),
                    )?;
                    let url = video.cloud_storage_file_name;
                    self.remember(visited, &url);
                    return Ok(url);
                }
                SourceType::RawMotion => {
                    let motion: RawMotion = self.store.fetch(&current.source_id).map_err(
                        storage_err(format!("getting raw motion {:?}", current.source_id)),
                    )?;
                    motion.source
                }
                SourceType::RawLocation => {
                    let location: RawLocation = self.store.fetch(&current.source_id).map_err(
                        storage_err(format!("getting raw location {:?}", current.source_id)),
                    )?;
                    location.source
                }
            };

            current = next.ok_or_else(|| {
                SanitizeError::BadState(format!(
                    "{} has no source; chain from {} never reaches a video",
                    current.key(),
                    source.key()
                ))
            })?;
        }

        Err(SanitizeError::BadState(format!(
            "source chain from {} does not reach a video within {} hops",
            source.key(),
            self.config.max_source_hops
        )))
    }

    fn remember(&mut self, keys: Vec<String>, url: &str) {
        for key in keys {
            self.video_links.insert(key, url.to_string());
        }
    }

    /// Build the external report of one trip
    pub fn build_external_trip(&mut self, trip: &Trip) -> Result<ExternalTrip, SanitizeError> {
        let by_trip = [Predicate::new(Field::TripId, Operator::Eq, trip.id.as_str())];

        let event_ids = self
            .store
            .find_ids::<Event>(&by_trip)
            .map_err(storage_err(format!("listing events of trip {:?}", trip.id)))?;
        let mut events = Vec::with_capacity(event_ids.len());
        for event_id in event_ids {
            let event: Event = self
                .store
                .fetch(&event_id)
                .map_err(storage_err(format!("getting event {:?}", event_id)))?;
            events.push(self.external_event(trip, event)?);
        }
        events.sort_by_key(|e| e.timestamp_ms);

        let condition_ids = self
            .store
            .find_ids::<DrivingConditionInternal>(&by_trip)
            .map_err(storage_err(format!("listing driving conditions of trip {:?}", trip.id)))?;
        let mut conditions = Vec::with_capacity(condition_ids.len());
        for condition_id in condition_ids {
            let dc: DrivingConditionInternal = self
                .store
                .fetch(&condition_id)
                .map_err(storage_err(format!("getting driving condition {:?}", condition_id)))?;
            let video_url = self.find_video_link(&dc.source)?;
            conditions.push(ResolvedCondition {
                condition_type: dc.condition_type,
                severity: dc.severity,
                start_time_ms: dc.start_time_ms,
                end_time_ms: dc.end_time_ms,
                video_url,
            });
        }

        let driving_conditions = consolidate_conditions(&conditions);
        debug!(
            "Trip {}: {} events, {} conditions flattened into {} segments",
            trip.id,
            events.len(),
            conditions.len(),
            driving_conditions.len()
        );

        Ok(ExternalTrip {
            trip_id: trip.id.clone(),
            start_time_ms: trip.start_time_ms,
            end_time_ms: trip.end_time_ms,
            events,
            driving_conditions,
        })
    }

    fn external_event(
        &mut self,
        trip: &Trip,
        event: Event,
    ) -> Result<ExternalEvent, SanitizeError> {
        if event.event_type == EventType::Unknown {
            return Err(SanitizeError::BadState(format!(
                "event {:?} in trip {:?} has unknown type",
                event.id, trip.id
            )));
        }
        if event.timestamp_ms == 0 {
            return Err(SanitizeError::BadState(format!(
                "event {:?} in trip {:?} has no timestamp",
                event.id, trip.id
            )));
        }

        let video_url = self.find_video_link(&event.source)?;
        Ok(ExternalEvent {
            event_type: event.event_type,
            severity: event.severity,
            value: event.value,
            timestamp_ms: event.timestamp_ms,
            external_source: ExternalSource::dashcam_video(video_url),
        })
    }

    /// Reports for every trip of `user_id` overlapping `[start_ms, end_ms]`,
    /// ordered by start time
    pub fn list_trips(
        &mut self,
        user_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<ExternalTrip>, SanitizeError> {
        let trip_ids = self
            .store
            .find_ids::<Trip>(&[
                Predicate::new(Field::UserId, Operator::Eq, user_id),
                Predicate::new(Field::EndTimeMs, Operator::Ge, start_ms),
                Predicate::new(Field::StartTimeMs, Operator::Le, end_ms),
            ])
            .map_err(storage_err(format!("listing trips of user {:?}", user_id)))?;

        let mut trips = Vec::with_capacity(trip_ids.len());
        for trip_id in trip_ids {
            let trip: Trip = self
                .store
                .fetch(&trip_id)
                .map_err(storage_err(format!("getting trip {:?}", trip_id)))?;
            trips.push(trip);
        }
        trips.sort_by_key(|t| t.start_time_ms);

        let reports = trips
            .iter()
            .map(|trip| self.build_external_trip(trip))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Listed {} trips for user {} in [{}, {}]",
            reports.len(),
            user_id,
            start_ms,
            end_ms
        );
        Ok(reports)
    }
}

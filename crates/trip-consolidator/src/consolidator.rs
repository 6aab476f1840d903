//! Trip Consolidator Implementation

use crate::{storage_err, ConsolidationError};
use std::sync::Arc;
use storage::{
    DrivingConditionInternal, Event, Field, Operator, Predicate, RecordStore, RecordStoreExt,
    Trip,
};
use tracing::{debug, info};

/// A trip taking part in a merge; the synthetic span of the new condition
/// has no id.
#[derive(Debug, Clone)]
struct Candidate {
    id: Option<String>,
    start_time_ms: i64,
    end_time_ms: i64,
}

impl From<Trip> for Candidate {
    fn from(trip: Trip) -> Self {
        Self {
            id: Some(trip.id),
            start_time_ms: trip.start_time_ms,
            end_time_ms: trip.end_time_ms,
        }
    }
}

/// Trip consolidation engine over a record store
pub struct TripConsolidator<S: ?Sized> {
    store: Arc<S>,
}

impl<S: RecordStore + ?Sized> TripConsolidator<S> {
    /// Create a consolidator writing through `store`
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Ids of the user's trips overlapping `[start_ms, end_ms]`, bounds inclusive
    pub fn overlapping_trip_ids(
        &self,
        user_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<String>, ConsolidationError> {
        self.store
            .find_ids::<Trip>(&[
                Predicate::new(Field::UserId, Operator::Eq, user_id),
                Predicate::new(Field::EndTimeMs, Operator::Ge, start_ms),
                Predicate::new(Field::StartTimeMs, Operator::Le, end_ms),
            ])
            .map_err(storage_err(format!(
                "listing trips between {} and {} for user {:?}",
                start_ms, end_ms, user_id
            )))
    }

    /// Fetch a trip that must belong to `user_id`
    pub fn get_trip(&self, user_id: &str, trip_id: &str) -> Result<Trip, ConsolidationError> {
        let trip: Trip = self
            .store
            .fetch(trip_id)
            .map_err(storage_err(format!("getting trip {:?}", trip_id)))?;

        if trip.user_id != user_id {
            return Err(ConsolidationError::BadState(format!(
                "trip {:?} belongs to user {:?}, expected {:?}",
                trip_id, trip.user_id, user_id
            )));
        }
        Ok(trip)
    }

    /// Attach an event to the trip containing its timestamp, creating a
    /// zero-length trip if none does, and persist it.
    pub fn record_event(&self, mut event: Event) -> Result<Event, ConsolidationError> {
        let trip_ids =
            self.overlapping_trip_ids(&event.user_id, event.timestamp_ms, event.timestamp_ms)?;

        event.trip_id = match trip_ids.as_slice() {
            [] => {
                let trip = Trip::new(event.user_id.clone(), event.timestamp_ms, event.timestamp_ms);
                self.create_unique_trip(trip)?.id
            }
            [trip_id] => trip_id.clone(),
            many => {
                return Err(ConsolidationError::BadState(format!(
                    "{} trips overlap timestamp {} for user {:?}: {:?}",
                    many.len(),
                    event.timestamp_ms,
                    event.user_id,
                    many
                )));
            }
        };

        let event = self
            .store
            .persist_new(event)
            .map_err(storage_err("creating event"))?;

        metrics::counter!("consolidator_events_recorded_total").increment(1);
        debug!("Recorded event {} in trip {}", event.id, event.trip_id);
        Ok(event)
    }

    /// Attach a driving condition to a trip, merging every trip its span
    /// touches into one, and persist it.
    pub fn record_condition(
        &self,
        mut condition: DrivingConditionInternal,
    ) -> Result<DrivingConditionInternal, ConsolidationError> {
        let trip_ids = self.overlapping_trip_ids(
            &condition.user_id,
            condition.start_time_ms,
            condition.end_time_ms,
        )?;

        condition.trip_id = self.merge_trips(&condition, trip_ids)?;

        let condition = self
            .store
            .persist_new(condition)
            .map_err(storage_err("creating driving condition"))?;

        metrics::counter!("consolidator_conditions_recorded_total").increment(1);
        debug!(
            "Recorded {} condition {} in trip {}",
            condition.condition_type, condition.id, condition.trip_id
        );
        Ok(condition)
    }

    /// Create a trip after re-checking that nothing overlaps it
    fn create_unique_trip(&self, trip: Trip) -> Result<Trip, ConsolidationError> {
        let existing =
            self.overlapping_trip_ids(&trip.user_id, trip.start_time_ms, trip.end_time_ms)?;
        if !existing.is_empty() {
            return Err(ConsolidationError::BadState(format!(
                "trip [{}, {}] for user {:?} would overlap existing trips {:?}",
                trip.start_time_ms, trip.end_time_ms, trip.user_id, existing
            )));
        }

        let trip = self
            .store
            .persist_new(trip)
            .map_err(storage_err("creating trip"))?;

        metrics::counter!("consolidator_trips_created_total").increment(1);
        info!(
            "Created trip {} for user {} spanning [{}, {}]",
            trip.id, trip.user_id, trip.start_time_ms, trip.end_time_ms
        );
        Ok(trip)
    }

    /// Pick the winning trip for `condition` among the trips it overlaps and
    /// fold the rest into it. Returns the winner's id.
    ///
    /// Steps already applied are not undone on failure. Children are moved
    /// before losers are deleted, so re-running the same call after a partial
    /// failure converges.
    fn merge_trips(
        &self,
        condition: &DrivingConditionInternal,
        trip_ids: Vec<String>,
    ) -> Result<String, ConsolidationError> {
        let user_id = condition.user_id.as_str();

        let mut candidates = vec![Candidate {
            id: None,
            start_time_ms: condition.start_time_ms,
            end_time_ms: condition.end_time_ms,
        }];
        for trip_id in &trip_ids {
            candidates.push(self.get_trip(user_id, trip_id)?.into());
        }
        // Stable: on equal starts the synthetic span stays ahead of real trips
        candidates.sort_by_key(|c| c.start_time_ms);

        let Some(winner_id) = candidates.iter().find_map(|c| c.id.clone()) else {
            let first = &candidates[0];
            let trip = Trip::new(user_id, first.start_time_ms, first.end_time_ms);
            return Ok(self.create_unique_trip(trip)?.id);
        };

        let new_start = candidates
            .iter()
            .map(|c| c.start_time_ms)
            .min()
            .unwrap_or(condition.start_time_ms);
        let new_end = candidates
            .iter()
            .map(|c| c.end_time_ms)
            .max()
            .unwrap_or(condition.end_time_ms);

        let losers: Vec<&str> = candidates
            .iter()
            .filter_map(|c| c.id.as_deref())
            .filter(|id| *id != winner_id)
            .collect();

        for loser in &losers {
            self.reparent_children(user_id, loser, &winner_id)?;
        }

        let winner = Trip {
            id: winner_id.clone(),
            user_id: user_id.to_string(),
            start_time_ms: new_start,
            end_time_ms: new_end,
        };
        self.store
            .put(&winner)
            .map_err(storage_err(format!("updating trip {:?}", winner_id)))?;

        for loser in &losers {
            self.store
                .remove::<Trip>(loser)
                .map_err(storage_err(format!("deleting merged trip {:?}", loser)))?;
        }

        if !losers.is_empty() {
            metrics::counter!("consolidator_trips_merged_total").increment(losers.len() as u64);
            info!(
                "Merged {} trip(s) into {} for user {}, now spanning [{}, {}]",
                losers.len(),
                winner_id,
                user_id,
                new_start,
                new_end
            );
        }
        Ok(winner_id)
    }

    /// Move every event and driving condition of `from_trip` to `to_trip`
    fn reparent_children(
        &self,
        user_id: &str,
        from_trip: &str,
        to_trip: &str,
    ) -> Result<usize, ConsolidationError> {
        let by_trip = [Predicate::new(Field::TripId, Operator::Eq, from_trip)];
        let mut moved = 0;

        let event_ids = self
            .store
            .find_ids::<Event>(&by_trip)
            .map_err(storage_err(format!("listing events of trip {:?}", from_trip)))?;
        for event_id in event_ids {
            let mut event: Event = self
                .store
                .fetch(&event_id)
                .map_err(storage_err(format!("getting event {:?}", event_id)))?;
            if event.user_id != user_id {
                return Err(ConsolidationError::BadState(format!(
                    "event {:?} in trip {:?} belongs to user {:?}, expected {:?}",
                    event_id, from_trip, event.user_id, user_id
                )));
            }
            event.trip_id = to_trip.to_string();
            self.store
                .put(&event)
                .map_err(storage_err(format!("re-parenting event {:?}", event_id)))?;
            moved += 1;
        }

        let condition_ids = self
            .store
            .find_ids::<DrivingConditionInternal>(&by_trip)
            .map_err(storage_err(format!("listing driving conditions of trip {:?}", from_trip)))?;
        for condition_id in condition_ids {
            let mut condition: DrivingConditionInternal = self
                .store
                .fetch(&condition_id)
                .map_err(storage_err(format!("getting driving condition {:?}", condition_id)))?;
            if condition.user_id != user_id {
                return Err(ConsolidationError::BadState(format!(
                    "driving condition {:?} in trip {:?} belongs to user {:?}, expected {:?}",
                    condition_id, from_trip, condition.user_id, user_id
                )));
            }
            condition.trip_id = to_trip.to_string();
            self.store.put(&condition).map_err(storage_err(format!(
                "re-parenting driving condition {:?}",
                condition_id
            )))?;
            moved += 1;
        }

        debug!("Moved {} record(s) from trip {} to {}", moved, from_trip, to_trip);
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use storage::{ConditionType, EventType, RecordKind, Repository, Source, SourceType};

    const HOUR: i64 = 3_600_000;
    const DAY: i64 = 24 * HOUR;
    const USER: &str = "user-1";

    fn setup() -> (Arc<Repository>, TripConsolidator<Repository>) {
        let repo = Arc::new(Repository::new());
        let consolidator = TripConsolidator::new(Arc::clone(&repo));
        (repo, consolidator)
    }

    fn source() -> Source {
        Source::new(SourceType::RawVideo, "video-1")
    }

    fn event(ts: i64) -> Event {
        Event::new(USER, ts, EventType::FastAcceleration, source())
    }

    fn condition(condition_type: ConditionType, start: i64, end: i64) -> DrivingConditionInternal {
        DrivingConditionInternal::new(USER, condition_type, 1.0, start, end, source())
    }

    fn user_trips(repo: &Repository) -> Vec<Trip> {
        let ids = repo
            .find_ids::<Trip>(&[Predicate::new(Field::UserId, Operator::Eq, USER)])
            .unwrap();
        let mut trips: Vec<Trip> = ids.iter().map(|id| repo.fetch(id).unwrap()).collect();
        trips.sort_by_key(|t| t.start_time_ms);
        trips
    }

    fn children_of(repo: &Repository, trip_id: &str) -> (Vec<String>, Vec<String>) {
        let by_trip = [Predicate::new(Field::TripId, Operator::Eq, trip_id)];
        (
            repo.find_ids::<Event>(&by_trip).unwrap(),
            repo.find_ids::<DrivingConditionInternal>(&by_trip).unwrap(),
        )
    }

    #[test]
    fn test_event_creates_point_trip() {
        let (repo, consolidator) = setup();
        let recorded = consolidator.record_event(event(10 * HOUR)).unwrap();

        let trips = user_trips(&repo);
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].id, recorded.trip_id);
        assert_eq!(trips[0].start_time_ms, 10 * HOUR);
        assert_eq!(trips[0].end_time_ms, 10 * HOUR);
    }

    #[test]
    fn test_event_on_trip_boundary_joins_trip() {
        let (repo, consolidator) = setup();
        let dc = consolidator
            .record_condition(condition(ConditionType::Night, HOUR, 2 * HOUR))
            .unwrap();

        let at_start = consolidator.record_event(event(HOUR)).unwrap();
        let at_end = consolidator.record_event(event(2 * HOUR)).unwrap();
        let outside = consolidator.record_event(event(2 * HOUR + 1)).unwrap();

        assert_eq!(at_start.trip_id, dc.trip_id);
        assert_eq!(at_end.trip_id, dc.trip_id);
        assert_ne!(outside.trip_id, dc.trip_id);
        assert_eq!(user_trips(&repo).len(), 2);
    }

    #[test]
    fn test_event_in_overlapping_trips_is_bad_state() {
        let (repo, consolidator) = setup();
        // Bypass the consolidator to plant an invariant violation
        repo.persist_new(Trip::new(USER, 0, 10 * HOUR)).unwrap();
        repo.persist_new(Trip::new(USER, 5 * HOUR, 15 * HOUR)).unwrap();

        let err = consolidator.record_event(event(7 * HOUR)).unwrap_err();
        assert!(err.is_bad_state());
        assert_eq!(repo.count(RecordKind::Event), 0);
    }

    #[test]
    fn test_trips_are_per_user() {
        let (repo, consolidator) = setup();
        let mine = consolidator.record_event(event(HOUR)).unwrap();
        let theirs = consolidator
            .record_event(Event::new("user-2", HOUR, EventType::LaneChange, source()))
            .unwrap();

        assert_ne!(mine.trip_id, theirs.trip_id);
        assert_eq!(repo.count(RecordKind::Trip), 2);
    }

    #[test]
    fn test_condition_without_overlap_creates_trip() {
        let (repo, consolidator) = setup();
        let dc = consolidator
            .record_condition(condition(ConditionType::Snow, HOUR, 3 * HOUR))
            .unwrap();

        let trips = user_trips(&repo);
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].id, dc.trip_id);
        assert_eq!((trips[0].start_time_ms, trips[0].end_time_ms), (HOUR, 3 * HOUR));
    }

    #[test]
    fn test_condition_extends_existing_trip() {
        let (repo, consolidator) = setup();
        let first = consolidator.record_event(event(2 * HOUR)).unwrap();
        let dc = consolidator
            .record_condition(condition(ConditionType::Rain, HOUR, 2 * HOUR))
            .unwrap();

        assert_eq!(dc.trip_id, first.trip_id);
        let trips = user_trips(&repo);
        assert_eq!(trips.len(), 1);
        assert_eq!((trips[0].start_time_ms, trips[0].end_time_ms), (HOUR, 2 * HOUR));
    }

    #[test]
    fn test_condition_bridging_three_trips_merges_into_earliest() {
        let (repo, consolidator) = setup();

        let a_event = consolidator.record_event(event(DAY + HOUR)).unwrap();
        let a_dc = consolidator
            .record_condition(condition(ConditionType::Night, DAY, DAY + 2 * HOUR))
            .unwrap();
        let b_event = consolidator.record_event(event(2 * DAY + HOUR)).unwrap();
        let b_dc = consolidator
            .record_condition(condition(ConditionType::Urban, 2 * DAY, 2 * DAY + 2 * HOUR))
            .unwrap();
        let c_event = consolidator.record_event(event(3 * DAY + HOUR)).unwrap();
        let c_dc = consolidator
            .record_condition(condition(ConditionType::Fog, 3 * DAY, 3 * DAY + 2 * HOUR))
            .unwrap();

        let trip_a = a_event.trip_id.clone();
        assert_eq!(a_dc.trip_id, trip_a);
        assert_eq!(user_trips(&repo).len(), 3);

        let bridge = consolidator
            .record_condition(condition(ConditionType::Snow, DAY + HOUR, 3 * DAY + HOUR))
            .unwrap();
        assert_eq!(bridge.trip_id, trip_a);

        let trips = user_trips(&repo);
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].id, trip_a);
        assert_eq!(trips[0].start_time_ms, DAY);
        assert_eq!(trips[0].end_time_ms, 3 * DAY + 2 * HOUR);

        let (events, conditions) = children_of(&repo, &trip_a);
        for id in [&a_event.id, &b_event.id, &c_event.id] {
            assert!(events.contains(id));
        }
        for id in [&a_dc.id, &b_dc.id, &c_dc.id, &bridge.id] {
            assert!(conditions.contains(id));
        }

        assert!(consolidator.get_trip(USER, &b_event.trip_id).unwrap_err().is_not_found());
        assert!(consolidator.get_trip(USER, &c_event.trip_id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_winner_is_earliest_existing_trip_not_condition() {
        let (repo, consolidator) = setup();
        let a = consolidator.record_event(event(2 * HOUR)).unwrap();
        let b = consolidator.record_event(event(4 * HOUR)).unwrap();

        // Starts before both trips; the synthetic span never wins
        let dc = consolidator
            .record_condition(condition(ConditionType::Snow, 0, 5 * HOUR))
            .unwrap();

        assert_eq!(dc.trip_id, a.trip_id);
        let trips = user_trips(&repo);
        assert_eq!(trips.len(), 1);
        assert_eq!((trips[0].start_time_ms, trips[0].end_time_ms), (0, 5 * HOUR));
        let moved: Event = repo.fetch(&b.id).unwrap();
        assert_eq!(moved.trip_id, a.trip_id);
    }

    #[test]
    fn test_foreign_trip_is_bad_state() {
        let (repo, consolidator) = setup();
        let other = repo.persist_new(Trip::new("user-2", 0, HOUR)).unwrap();
        let err = consolidator.get_trip(USER, &other.id).unwrap_err();
        assert!(err.is_bad_state());
    }

    #[test]
    fn test_partial_merge_failure_then_retry_converges() {
        let (repo, consolidator) = setup();
        let a = consolidator.record_event(event(HOUR)).unwrap();
        let b1 = consolidator.record_event(event(5 * HOUR)).unwrap();
        consolidator
            .record_condition(condition(ConditionType::Urban, 5 * HOUR, 6 * HOUR))
            .unwrap();
        let b2 = consolidator.record_event(event(6 * HOUR)).unwrap();

        // First re-parent write succeeds, the rest of the merge fails
        repo.fail_writes_after(1);
        let bridge = condition(ConditionType::Snow, HOUR, 5 * HOUR);
        let err = consolidator.record_condition(bridge.clone()).unwrap_err();
        assert!(matches!(err, ConsolidationError::Storage { .. }));
        assert_eq!(user_trips(&repo).len(), 2);

        repo.clear_failures();
        let dc = consolidator.record_condition(bridge).unwrap();
        assert_eq!(dc.trip_id, a.trip_id);

        let trips = user_trips(&repo);
        assert_eq!(trips.len(), 1);
        let (events, conditions) = children_of(&repo, &a.trip_id);
        assert_eq!(events.len(), 3);
        assert!(events.contains(&b1.id) && events.contains(&b2.id));
        assert_eq!(conditions.len(), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Event(i64),
        Condition(i64, i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0i64..200).prop_map(Op::Event),
            (0i64..200, 0i64..30).prop_map(|(start, len)| Op::Condition(start, start + len)),
        ]
    }

    proptest! {
        #[test]
        fn prop_trips_never_overlap(ops in proptest::collection::vec(op_strategy(), 1..40)) {
            let (repo, consolidator) = setup();
            for op in ops {
                match op {
                    Op::Event(ts) => {
                        consolidator.record_event(event(ts)).unwrap();
                    }
                    Op::Condition(start, end) => {
                        consolidator
                            .record_condition(condition(ConditionType::Rain, start, end))
                            .unwrap();
                    }
                }
            }

            let trips = user_trips(&repo);
            for pair in trips.windows(2) {
                prop_assert!(pair[0].end_time_ms < pair[1].start_time_ms);
            }

            let trip_ids: Vec<&str> = trips.iter().map(|t| t.id.as_str()).collect();
            let mut children = 0;
            for trip_id in &trip_ids {
                let (events, conditions) = children_of(&repo, trip_id);
                children += events.len() + conditions.len();
            }
            prop_assert_eq!(
                children,
                repo.count(RecordKind::Event) + repo.count(RecordKind::DrivingCondition)
            );
        }
    }
}

//! Storage Layer
//!
//! Telemetry record model (trips, events, driving conditions, raw sensor
//! records) and the kind-agnostic record store contract the consolidation
//! engine is written against, with an in-memory repository implementation.

mod model;
mod repository;
mod store;

pub use model::{
    ConditionType, Coordinate, DrivingConditionInternal, Event, EventType, RawLocation,
    RawMotion, RawVideo, Source, SourceType, Trip, User,
};
pub use repository::Repository;
pub use store::{
    Field, FieldValue, Operator, Predicate, Record, RecordKind, RecordStore, RecordStoreExt,
    StoredRecord,
};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("{kind} with ID {id:?} not found")]
    NotFound { kind: RecordKind, id: String },
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Expected {expected} record, got {actual}")]
    KindMismatch {
        expected: RecordKind,
        actual: RecordKind,
    },
}

impl StorageError {
    /// Whether the error reports a missing record
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

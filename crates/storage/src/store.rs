//! Record Store Contract
//!
//! A kind-agnostic keyed store: list ids by ANDed field predicates, get by id,
//! create (assigns id), update in place, and delete. Typed access goes through
//! [`RecordStoreExt`].

use crate::model::{DrivingConditionInternal, Event, RawLocation, RawMotion, RawVideo, Trip, User};
use crate::StorageError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Kind (table) of a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    User,
    Trip,
    Event,
    DrivingCondition,
    RawVideo,
    RawMotion,
    RawLocation,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::User => "Users",
            RecordKind::Trip => "Trips",
            RecordKind::Event => "Events",
            RecordKind::DrivingCondition => "DrivingConditions",
            RecordKind::RawVideo => "RawVideos",
            RecordKind::RawMotion => "RawMotions",
            RecordKind::RawLocation => "RawLocations",
        };
        f.write_str(name)
    }
}

/// Queryable record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    UserId,
    TripId,
    StartTimeMs,
    EndTimeMs,
    TimestampMs,
    CreateTimeMs,
    Email,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::UserId => "UserId",
            Field::TripId => "TripId",
            Field::StartTimeMs => "StartTimeMs",
            Field::EndTimeMs => "EndTimeMs",
            Field::TimestampMs => "TimestampMs",
            Field::CreateTimeMs => "CreateTimeMs",
            Field::Email => "Email",
        };
        f.write_str(name)
    }
}

/// Field value used in predicates
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => Some(a.cmp(b)),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(b),
            (FieldValue::Int(a), FieldValue::Float(b)) => (*a as f64).partial_cmp(b),
            (FieldValue::Float(a), FieldValue::Int(b)) => a.partial_cmp(&(*b as f64)),
            (FieldValue::Str(a), FieldValue::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Str(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    /// Evaluate `lhs <op> rhs`; incomparable values never match
    pub fn evaluate(self, lhs: &FieldValue, rhs: &FieldValue) -> bool {
        let Some(ordering) = lhs.compare(rhs) else {
            return false;
        };
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        };
        f.write_str(op)
    }
}

/// `(field, operator, value)` filter; a store ANDs all predicates of a query
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: Field,
    pub op: Operator,
    pub value: FieldValue,
}

impl Predicate {
    pub fn new(field: Field, op: Operator, value: impl Into<FieldValue>) -> Self {
        Self {
            field,
            op,
            value: value.into(),
        }
    }

    /// Records lacking the field never match
    pub fn matches(&self, record: &Record) -> bool {
        record
            .field(self.field)
            .map_or(false, |actual| self.op.evaluate(&actual, &self.value))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.value)
    }
}

/// Any storable record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    User(User),
    Trip(Trip),
    Event(Event),
    DrivingCondition(DrivingConditionInternal),
    RawVideo(RawVideo),
    RawMotion(RawMotion),
    RawLocation(RawLocation),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::User(_) => RecordKind::User,
            Record::Trip(_) => RecordKind::Trip,
            Record::Event(_) => RecordKind::Event,
            Record::DrivingCondition(_) => RecordKind::DrivingCondition,
            Record::RawVideo(_) => RecordKind::RawVideo,
            Record::RawMotion(_) => RecordKind::RawMotion,
            Record::RawLocation(_) => RecordKind::RawLocation,
        }
    }

    pub fn set_id(&mut self, id: &str) {
        let slot = match self {
            Record::User(r) => &mut r.id,
            Record::Trip(r) => &mut r.id,
            Record::Event(r) => &mut r.id,
            Record::DrivingCondition(r) => &mut r.id,
            Record::RawVideo(r) => &mut r.id,
            Record::RawMotion(r) => &mut r.id,
            Record::RawLocation(r) => &mut r.id,
        };
        *slot = id.to_string();
    }

    /// Value of a queryable field, if the record kind has it
    pub fn field(&self, field: Field) -> Option<FieldValue> {
        let value: FieldValue = match (self, field) {
            (Record::User(r), Field::UserId) => r.id.as_str().into(),
            (Record::User(r), Field::Email) => r.email.as_str().into(),
            (Record::User(r), Field::CreateTimeMs) => r.create_time_ms.into(),

            (Record::Trip(r), Field::UserId) => r.user_id.as_str().into(),
            (Record::Trip(r), Field::StartTimeMs) => r.start_time_ms.into(),
            (Record::Trip(r), Field::EndTimeMs) => r.end_time_ms.into(),

            (Record::Event(r), Field::UserId) => r.user_id.as_str().into(),
            (Record::Event(r), Field::TripId) => r.trip_id.as_str().into(),
            (Record::Event(r), Field::TimestampMs) => r.timestamp_ms.into(),

            (Record::DrivingCondition(r), Field::UserId) => r.user_id.as_str().into(),
            (Record::DrivingCondition(r), Field::TripId) => r.trip_id.as_str().into(),
            (Record::DrivingCondition(r), Field::StartTimeMs) => r.start_time_ms.into(),
            (Record::DrivingCondition(r), Field::EndTimeMs) => r.end_time_ms.into(),

            (Record::RawVideo(r), Field::UserId) => r.user_id.as_str().into(),
            (Record::RawVideo(r), Field::CreateTimeMs) => r.create_time_ms.into(),

            (Record::RawMotion(r), Field::UserId) => r.user_id.as_str().into(),
            (Record::RawMotion(r), Field::TimestampMs) => r.timestamp_ms.into(),

            (Record::RawLocation(r), Field::UserId) => r.user_id.as_str().into(),
            (Record::RawLocation(r), Field::TimestampMs) => r.timestamp_ms.into(),

            _ => return None,
        };
        Some(value)
    }
}

/// Keyed store over all record kinds.
///
/// Implementations provide no cross-call isolation; callers serialize
/// conflicting writes.
pub trait RecordStore {
    /// Ids of records of `kind` matching every predicate
    fn list_ids(
        &self,
        kind: RecordKind,
        predicates: &[Predicate],
    ) -> Result<Vec<String>, StorageError>;

    /// Fetch a record, `None` if absent
    fn get_by_id(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StorageError>;

    /// Store a new record under a freshly assigned id and return the id
    fn create(&self, record: Record) -> Result<String, StorageError>;

    /// Replace an existing record; fails if `id` does not exist
    fn insert(&self, id: &str, record: Record) -> Result<(), StorageError>;

    /// Delete an existing record; fails if `id` does not exist
    fn delete_by_id(&self, kind: RecordKind, id: &str) -> Result<(), StorageError>;
}

/// Concrete record type stored under a single [`RecordKind`]
pub trait StoredRecord: Clone + Into<Record> {
    const KIND: RecordKind;

    fn from_record(record: Record) -> Result<Self, StorageError>;

    fn record_id(&self) -> &str;
}

macro_rules! stored_record {
    ($ty:ident, $variant:ident) => {
        impl From<$ty> for Record {
            fn from(r: $ty) -> Self {
                Record::$variant(r)
            }
        }

        impl StoredRecord for $ty {
            const KIND: RecordKind = RecordKind::$variant;

            fn from_record(record: Record) -> Result<Self, StorageError> {
                match record {
                    Record::$variant(r) => Ok(r),
                    other => Err(StorageError::KindMismatch {
                        expected: RecordKind::$variant,
                        actual: other.kind(),
                    }),
                }
            }

            fn record_id(&self) -> &str {
                &self.id
            }
        }
    };
}

stored_record!(User, User);
stored_record!(Trip, Trip);
stored_record!(Event, Event);
stored_record!(DrivingConditionInternal, DrivingCondition);
stored_record!(RawVideo, RawVideo);
stored_record!(RawMotion, RawMotion);
stored_record!(RawLocation, RawLocation);

/// Typed helpers over any [`RecordStore`]
pub trait RecordStoreExt: RecordStore {
    /// Fetch a record that must exist
    fn fetch<T: StoredRecord>(&self, id: &str) -> Result<T, StorageError> {
        let record = self
            .get_by_id(T::KIND, id)?
            .ok_or_else(|| StorageError::NotFound {
                kind: T::KIND,
                id: id.to_string(),
            })?;
        T::from_record(record)
    }

    /// Create a record and return it with its assigned id
    fn persist_new<T: StoredRecord>(&self, record: T) -> Result<T, StorageError> {
        let mut record: Record = record.into();
        let id = self.create(record.clone())?;
        record.set_id(&id);
        T::from_record(record)
    }

    /// Overwrite an existing record under its own id
    fn put<T: StoredRecord>(&self, record: &T) -> Result<(), StorageError> {
        self.insert(record.record_id(), record.clone().into())
    }

    /// Delete a record of `T`'s kind
    fn remove<T: StoredRecord>(&self, id: &str) -> Result<(), StorageError> {
        self.delete_by_id(T::KIND, id)
    }

    /// Ids of `T` records matching every predicate
    fn find_ids<T: StoredRecord>(
        &self,
        predicates: &[Predicate],
    ) -> Result<Vec<String>, StorageError> {
        self.list_ids(T::KIND, predicates)
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}

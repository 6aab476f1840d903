//! Repository Implementation

use crate::store::{Predicate, Record, RecordKind, RecordStore};
use crate::StorageError;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

type Tables = BTreeMap<RecordKind, BTreeMap<String, Vec<u8>>>;

/// In-memory record store.
///
/// Records are kept postcard-encoded, so every read hands out a detached
/// copy, the same as a remote document store would.
pub struct Repository {
    /// Encoded records by kind, then id
    tables: Mutex<Tables>,
    /// Writes left before injected failures start (`None` = never fail)
    write_budget: Mutex<Option<usize>>,
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        info!("Creating in-memory record repository");
        Self {
            tables: Mutex::new(BTreeMap::new()),
            write_budget: Mutex::new(None),
        }
    }

    /// Let `writes` more create/insert/delete calls succeed, then fail every
    /// write until [`Repository::clear_failures`] is called.
    pub fn fail_writes_after(&self, writes: usize) {
        if let Ok(mut budget) = self.write_budget.lock() {
            *budget = Some(writes);
        }
    }

    /// Stop injecting write failures
    pub fn clear_failures(&self) {
        if let Ok(mut budget) = self.write_budget.lock() {
            *budget = None;
        }
    }

    /// Number of stored records of a kind
    pub fn count(&self, kind: RecordKind) -> usize {
        self.tables
            .lock()
            .map(|t| t.get(&kind).map_or(0, |table| table.len()))
            .unwrap_or(0)
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }

    fn charge_write(&self) -> Result<(), StorageError> {
        let mut budget = self
            .write_budget
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        match budget.as_mut() {
            Some(0) => {
                warn!("Injected write failure");
                Err(StorageError::DatabaseError("injected write failure".to_string()))
            }
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(record: &Record) -> Result<Vec<u8>, StorageError> {
    postcard::to_allocvec(record).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Record, StorageError> {
    postcard::from_bytes(bytes).map_err(|e| StorageError::SerializationError(e.to_string()))
}

impl RecordStore for Repository {
    fn list_ids(
        &self,
        kind: RecordKind,
        predicates: &[Predicate],
    ) -> Result<Vec<String>, StorageError> {
        let tables = self.tables()?;
        let Some(table) = tables.get(&kind) else {
            return Ok(Vec::new());
        };

        let mut ids = Vec::new();
        for (id, bytes) in table {
            let record = decode(bytes)?;
            if predicates.iter().all(|p| p.matches(&record)) {
                ids.push(id.clone());
            }
        }
        Ok(ids)
    }

    fn get_by_id(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StorageError> {
        let tables = self.tables()?;
        let record = match tables.get(&kind).and_then(|table| table.get(id)) {
            Some(bytes) => Some(decode(bytes)?),
            None => None,
        };
        Ok(record)
    }

    fn create(&self, mut record: Record) -> Result<String, StorageError> {
        self.charge_write()?;

        let id = Uuid::new_v4().to_string();
        record.set_id(&id);
        let bytes = encode(&record)?;

        let mut tables = self.tables()?;
        tables.entry(record.kind()).or_default().insert(id.clone(), bytes);
        debug!("Created {} record {}", record.kind(), id);
        Ok(id)
    }

    fn insert(&self, id: &str, mut record: Record) -> Result<(), StorageError> {
        self.charge_write()?;

        let kind = record.kind();
        record.set_id(id);
        let bytes = encode(&record)?;

        let mut tables = self.tables()?;
        let slot = tables
            .get_mut(&kind)
            .and_then(|table| table.get_mut(id))
            .ok_or_else(|| StorageError::NotFound {
                kind,
                id: id.to_string(),
            })?;
        *slot = bytes;
        debug!("Updated {} record {}", kind, id);
        Ok(())
    }

    fn delete_by_id(&self, kind: RecordKind, id: &str) -> Result<(), StorageError> {
        self.charge_write()?;

        let mut tables = self.tables()?;
        tables
            .get_mut(&kind)
            .and_then(|table| table.remove(id))
            .ok_or_else(|| StorageError::NotFound {
                kind,
                id: id.to_string(),
            })?;
        debug!("Deleted {} record {}", kind, id);
        Ok(())
    }
}

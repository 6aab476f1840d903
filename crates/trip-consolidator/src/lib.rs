//! Trip Consolidation Engine
//!
//! Assigns every incoming event (a point in time) and driving condition
//! (a time range) to exactly one trip of its user:
//! - creates a trip when nothing overlaps
//! - extends a trip the new fact overlaps
//! - folds any number of trips a new condition bridges into one winner,
//!   re-parenting the losers' children before deleting them
//!
//! No locking is done here. Callers must serialize consolidation per user.

mod consolidator;

pub use consolidator::TripConsolidator;

use storage::StorageError;
use thiserror::Error;

/// Consolidation error types
#[derive(Error, Debug)]
pub enum ConsolidationError {
    /// An invariant the engine relies on was violated; not retryable
    #[error("Bad state: {0}")]
    BadState(String),

    /// Record store failure, with the step that issued the call
    #[error("Storage error while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: StorageError,
    },
}

impl ConsolidationError {
    pub fn is_bad_state(&self) -> bool {
        matches!(self, ConsolidationError::BadState(_))
    }

    /// Whether a referenced record was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConsolidationError::Storage { source, .. } if source.is_not_found())
    }
}

/// Wrap a storage error with the step that produced it
pub(crate) fn storage_err(
    context: impl Into<String>,
) -> impl FnOnce(StorageError) -> ConsolidationError {
    let context = context.into();
    move |source| ConsolidationError::Storage { context, source }
}

//! Transaction state.

use crate::collection::LogSnapshot;
use crate::index::IndexSet;
use crate::types::TransactionId;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and buffering writes.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// What an active transaction needs to undo itself: the data log position
/// and a copy of the indexes as they were at `begin`.
#[derive(Debug)]
pub(crate) struct Rollback {
    id: TransactionId,
    log: LogSnapshot,
    indexes: IndexSet,
    writes: usize,
}

impl Rollback {
    pub(crate) fn new(id: TransactionId, log: LogSnapshot, indexes: IndexSet) -> Self {
        Self {
            id,
            log,
            indexes,
            writes: 0,
        }
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    /// Data log state at `begin`.
    pub(crate) fn snapshot(&self) -> &LogSnapshot {
        &self.log
    }

    /// Counts a buffered mutation.
    pub(crate) fn record_write(&mut self) {
        self.writes += 1;
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes
    }

    pub(crate) fn into_parts(self) -> (LogSnapshot, IndexSet) {
        (self.log, self.indexes)
    }
}

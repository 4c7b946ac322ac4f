//! Per-collection transactions.
//!
//! A collection has at most one active transaction, owned by the thread
//! that began it. Mutations made by the owner are buffered in the data log
//! and become visible to other threads only after commit; other threads
//! block until the transaction ends.
//!
//! Commit writes the buffered records as one batch. Abort restores the data
//! log and indexes to their state at `begin`.

mod manager;
mod state;

pub use manager::TransactionManager;
pub(crate) use state::Rollback;
pub use state::TransactionState;

use crate::collection::Collection;
use crate::error::CoreResult;
use crate::types::TransactionId;
use tracing::warn;

/// Scoped transaction that aborts when dropped unless committed.
///
/// The guard ends its own transaction by id, so it may be committed,
/// aborted or dropped on a thread other than the one that began it.
///
/// ```no_run
/// # use docudb_core::{Database, Document};
/// # fn run(db: &Database) -> docudb_core::CoreResult<()> {
/// let users = db.collection_or_create("users")?;
/// let txn = users.begin_scoped()?;
/// users.insert(Document::new().with("name", "Ana"))?;
/// txn.commit()?;
/// # Ok(())
/// # }
/// ```
#[must_use = "dropping the guard aborts the transaction"]
pub struct TransactionGuard {
    collection: Collection,
    id: TransactionId,
    state: TransactionState,
}

impl TransactionGuard {
    pub(crate) fn new(collection: Collection, id: TransactionId) -> Self {
        Self {
            collection,
            id,
            state: TransactionState::Active,
        }
    }

    /// Identifier of the transaction.
    #[must_use]
    pub const fn id(&self) -> TransactionId {
        self.id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TransactionState {
        self.state
    }

    /// Commits the transaction.
    pub fn commit(mut self) -> CoreResult<()> {
        // A failed commit has already rolled back.
        self.state = TransactionState::Aborted;
        self.collection.commit_by_id(self.id)?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Aborts the transaction.
    pub fn abort(mut self) -> CoreResult<()> {
        self.state = TransactionState::Aborted;
        self.collection.abort_by_id(self.id)
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if self.state != TransactionState::Active {
            return;
        }
        if self.collection.active_transaction() != Some(self.id) {
            return;
        }
        if let Err(err) = self.collection.abort_by_id(self.id) {
            warn!(txid = %self.id, error = %err, "failed to abort dropped transaction");
        }
    }
}

impl std::fmt::Debug for TransactionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionGuard")
            .field("collection", &self.collection.name())
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

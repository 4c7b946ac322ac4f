//! Transaction manager.

use crate::types::TransactionId;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Owner {
    id: TransactionId,
    thread: ThreadId,
}

/// Arbitrates the single transaction a collection may have at a time.
///
/// The manager records which thread owns the active transaction. Other
/// threads wait in [`TransactionManager::wait_turn`] until it ends; the
/// owning thread passes straight through.
///
/// The manager only tracks ownership. Callers pair it with the collection's
/// state lock, always taking the state lock first.
pub struct TransactionManager {
    active: Mutex<Option<Owner>>,
    released: Condvar,
    next_txid: AtomicU64,
}

impl TransactionManager {
    /// Creates a manager with no active transaction.
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
            released: Condvar::new(),
            next_txid: AtomicU64::new(1),
        }
    }

    /// Blocks while a transaction owned by another thread is active.
    pub fn wait_turn(&self) {
        let me = thread::current().id();
        let mut active = self.active.lock();
        while active.is_some_and(|owner| owner.thread != me) {
            self.released.wait(&mut active);
        }
    }

    /// Whether the calling thread may proceed: no transaction is active, or
    /// the caller owns it.
    #[must_use]
    pub fn may_proceed(&self) -> bool {
        let me = thread::current().id();
        self.active.lock().map_or(true, |owner| owner.thread == me)
    }

    /// Claims the transaction slot for the calling thread.
    ///
    /// Returns `None` if any transaction is already active, including one
    /// owned by the caller.
    pub fn try_begin(&self) -> Option<TransactionId> {
        let mut active = self.active.lock();
        if active.is_some() {
            return None;
        }
        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        *active = Some(Owner {
            id,
            thread: thread::current().id(),
        });
        debug!(txid = %id, "transaction slot claimed");
        Some(id)
    }

    /// The active transaction, if any.
    #[must_use]
    pub fn active(&self) -> Option<TransactionId> {
        self.active.lock().map(|owner| owner.id)
    }

    /// Whether the calling thread owns the active transaction.
    #[must_use]
    pub fn owned_by_current(&self) -> bool {
        let me = thread::current().id();
        self.active.lock().is_some_and(|owner| owner.thread == me)
    }

    /// Frees the slot and wakes waiting threads.
    pub fn end(&self, id: TransactionId) {
        let mut active = self.active.lock();
        if active.is_some_and(|owner| owner.id == id) {
            *active = None;
            self.released.notify_all();
            debug!(txid = %id, "transaction slot released");
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active", &self.active())
            .field("next_txid", &self.next_txid.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn ids_increase() {
        let tm = TransactionManager::new();
        let first = tm.try_begin().unwrap();
        tm.end(first);
        let second = tm.try_begin().unwrap();
        assert!(second > first);
    }

    #[test]
    fn only_one_active() {
        let tm = TransactionManager::new();
        let id = tm.try_begin().unwrap();
        assert!(tm.try_begin().is_none());
        assert_eq!(tm.active(), Some(id));
        assert!(tm.owned_by_current());
        assert!(tm.may_proceed());
        tm.end(id);
        assert!(tm.active().is_none());
    }

    #[test]
    fn ending_a_stale_id_is_ignored() {
        let tm = TransactionManager::new();
        let id = tm.try_begin().unwrap();
        tm.end(TransactionId::new(id.as_u64() + 10));
        assert_eq!(tm.active(), Some(id));
    }

    #[test]
    fn other_threads_wait_for_release() {
        let tm = Arc::new(TransactionManager::new());
        let id = tm.try_begin().unwrap();
        let passed = Arc::new(AtomicBool::new(false));

        let waiter = {
            let tm = Arc::clone(&tm);
            let passed = Arc::clone(&passed);
            std::thread::spawn(move || {
                assert!(!tm.may_proceed());
                tm.wait_turn();
                passed.store(true, Ordering::SeqCst);
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!passed.load(Ordering::SeqCst));
        tm.end(id);
        waiter.join().unwrap();
        assert!(passed.load(Ordering::SeqCst));
    }
}

//! Collections: named document stores with their indexes.
//!
//! Each collection owns an append-only data log (see `log`) and an
//! [`IndexSet`]. Every mutation updates both under the collection's state
//! lock, so readers never observe a document without its index entries or
//! the reverse.
//!
//! ## Locking
//!
//! A collection has one `RwLock` over its state and a
//! [`TransactionManager`] recording which thread owns the active
//! transaction. The state lock is always taken first. Threads other than
//! the transaction owner wait for the transaction to end before reading or
//! writing.

mod log;
pub(crate) mod record;

pub use log::CompactionStats;
pub(crate) use log::{DataLog, LogSnapshot};

use crate::config::{CollectionOptions, OpenMode};
use crate::database::Catalog;
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::index::persistence::{decode_index, encode_index};
use crate::index::{FieldIndex, IndexChange, IndexInfo, IndexKind, IndexRequest, IndexSet};
use crate::query::exec::{self, DocumentSink, DocumentSource, Hit};
use crate::query::{Query, QueryLog, QueryMode, QueryOptions, QueryResult};
use crate::transaction::{Rollback, TransactionGuard, TransactionManager};
use crate::types::TransactionId;
use docudb_codec::{Document, ObjectId, Value, ID_FIELD};
use docudb_storage::StorageBackend;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Mutable state guarded by the collection lock.
#[derive(Debug)]
pub(crate) struct CollectionState {
    name: String,
    pub(crate) log: DataLog,
    pub(crate) indexes: IndexSet,
    rollback: Option<Rollback>,
}

impl CollectionState {
    fn note_write(&mut self) {
        if let Some(rollback) = self.rollback.as_mut() {
            rollback.record_write();
        }
    }

    fn insert_doc(&mut self, oid: ObjectId, doc: &Document) -> CoreResult<()> {
        if self.log.contains(&oid) {
            return Err(CoreError::DuplicateKey {
                collection: self.name.clone(),
                oid,
            });
        }
        self.log.put(oid, doc)?;
        self.indexes.insert_doc(oid, doc);
        self.note_write();
        Ok(())
    }
}

fn load_all(log: &DataLog) -> CoreResult<Vec<(ObjectId, Arc<Document>)>> {
    let mut docs = Vec::with_capacity(log.len());
    for oid in log.ids() {
        if let Some(doc) = log.get(&oid)? {
            docs.push((oid, doc));
        }
    }
    Ok(docs)
}

impl DocumentSource for CollectionState {
    fn ids(&self) -> Vec<ObjectId> {
        self.log.ids().collect()
    }

    fn load(&self, oid: &ObjectId) -> CoreResult<Option<Arc<Document>>> {
        self.log.get(oid)
    }

    fn index_set(&self) -> &IndexSet {
        &self.indexes
    }
}

impl DocumentSink for CollectionState {
    fn replace(&mut self, oid: ObjectId, old: &Document, new: &Document) -> CoreResult<()> {
        self.log.put(oid, new)?;
        self.indexes.replace_doc(oid, old, new);
        self.note_write();
        Ok(())
    }

    fn delete(&mut self, oid: ObjectId, old: &Document) -> CoreResult<()> {
        self.log.remove(oid)?;
        self.indexes.remove_doc(oid, old);
        self.note_write();
        Ok(())
    }

    fn insert_new(&mut self, mut doc: Document) -> CoreResult<Document> {
        let oid = assign_id(&mut doc)?;
        self.insert_doc(oid, &doc)?;
        Ok(doc)
    }
}

/// Shared part of a collection, referenced by every handle.
pub(crate) struct CollectionShared {
    name: String,
    options: CollectionOptions,
    state: RwLock<CollectionState>,
    txn: TransactionManager,
    index_defs: Mutex<Vec<(String, IndexKind)>>,
    dropped: AtomicBool,
}

impl CollectionShared {
    /// Opens a collection over `backend`, loading persisted indexes from
    /// `dir` and rebuilding any that are missing or stale.
    pub(crate) fn open(
        name: &str,
        options: CollectionOptions,
        backend: Box<dyn StorageBackend>,
        index_defs: &[(String, IndexKind)],
        dir: Option<&DatabaseDir>,
    ) -> CoreResult<Self> {
        let log = DataLog::open(backend, options.cached_records as usize)?;
        let data_size = log.size()?;
        let mut state = CollectionState {
            name: name.to_string(),
            log,
            indexes: IndexSet::new(),
            rollback: None,
        };

        let mut docs = None;
        for (field, kind) in index_defs {
            let persisted = dir.and_then(|d| fs::read(d.index_path(name, field, *kind)).ok());
            let reason = match persisted.as_deref().map(decode_index) {
                Some(Ok((index, size)))
                    if size == data_size && index.path() == field && index.kind() == *kind =>
                {
                    state.indexes.install(index);
                    continue;
                }
                Some(Ok(_)) => "stale",
                Some(Err(_)) => "corrupt",
                None => "missing",
            };
            if dir.is_some() {
                warn!(collection = name, field = %field, %kind, reason, "rebuilding index");
            }
            if docs.is_none() {
                docs = Some(load_all(&state.log)?);
            }
            let mut index = FieldIndex::new(field.as_str(), *kind);
            for (oid, doc) in docs.iter().flatten() {
                index.insert_doc(*oid, doc);
            }
            state.indexes.install(index);
        }

        debug!(
            collection = name,
            records = state.log.len(),
            indexes = index_defs.len(),
            "collection opened"
        );
        Ok(Self {
            name: name.to_string(),
            options,
            state: RwLock::new(state),
            txn: TransactionManager::new(),
            index_defs: Mutex::new(index_defs.to_vec()),
            dropped: AtomicBool::new(false),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn options(&self) -> CollectionOptions {
        self.options
    }

    pub(crate) fn index_defs(&self) -> Vec<(String, IndexKind)> {
        self.index_defs.lock().clone()
    }

    pub(crate) fn record_count(&self) -> usize {
        self.state.read().log.len()
    }

    pub(crate) fn index_infos(&self) -> Vec<IndexInfo> {
        self.state.read().indexes.infos()
    }

    /// Point read used to resolve `$join` references. It does not wait for
    /// a transaction; while another thread's transaction is active it reads
    /// the committed state instead of that transaction's buffered writes.
    pub(crate) fn lookup(&self, oid: &ObjectId) -> Option<Document> {
        if self.dropped.load(Ordering::SeqCst) {
            return None;
        }
        let state = self.state.read();
        let doc = match state.rollback.as_ref() {
            Some(rollback) if !self.txn.owned_by_current() => {
                state.log.get_committed(rollback.snapshot(), oid)
            }
            _ => state.log.get(oid),
        };
        doc.ok().flatten().map(Arc::unwrap_or_clone)
    }

    /// Marks every handle invalid and discards an unfinished transaction.
    pub(crate) fn invalidate(&self) {
        self.dropped.store(true, Ordering::SeqCst);
        self.abort_unfinished();
    }

    /// Rolls back a transaction left active, e.g. at database close.
    pub(crate) fn abort_unfinished(&self) {
        let mut state = self.state.write();
        if let Some(rollback) = state.rollback.take() {
            let id = rollback.id();
            warn!(collection = %self.name, txid = %id, "aborting transaction of closed collection");
            restore(&mut state, rollback);
            self.txn.end(id);
        }
    }

    /// Flushes the data log and, outside a transaction, persists indexes.
    pub(crate) fn sync(&self, dir: Option<&DatabaseDir>) -> CoreResult<()> {
        let mut state = self.state.write();
        state.log.sync()?;
        if state.rollback.is_none() {
            persist_indexes(&self.name, &state, dir)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CollectionShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionShared")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("dropped", &self.dropped.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

fn restore(state: &mut CollectionState, rollback: Rollback) {
    let (snapshot, indexes) = rollback.into_parts();
    let discarded = state.log.abort_batch(snapshot);
    state.indexes = indexes;
    debug!(discarded, "restored pre-transaction state");
}

fn persist_indexes(name: &str, state: &CollectionState, dir: Option<&DatabaseDir>) -> CoreResult<()> {
    let Some(dir) = dir else {
        return Ok(());
    };
    let size = state.log.size()?;
    for index in state.indexes.iter() {
        dir.save_index(name, index.path(), index.kind(), &encode_index(index, size))?;
    }
    Ok(())
}

/// Normalizes `_id`: generates one if absent, converts a valid hex string,
/// and moves it to the front of the document.
fn assign_id(doc: &mut Document) -> CoreResult<ObjectId> {
    let oid = match doc.get(ID_FIELD) {
        None => ObjectId::new(),
        Some(Value::ObjectId(oid)) => *oid,
        Some(Value::String(s)) => ObjectId::parse_str(s).map_err(|_| {
            CoreError::type_mismatch(format!("_id '{s}' is not a valid object id"))
        })?,
        Some(other) => {
            return Err(CoreError::type_mismatch(format!(
                "_id must be an object id, got {}",
                other.type_name()
            )))
        }
    };
    doc.set_id(oid);
    Ok(oid)
}

/// Handle to a collection.
///
/// Handles are cheap to clone. They stay valid until the collection is
/// dropped or the database closed; afterwards every call fails with
/// `CollectionNotFound` or `DatabaseClosed`.
#[derive(Clone)]
pub struct Collection {
    shared: Arc<CollectionShared>,
    catalog: Weak<Catalog>,
}

impl Collection {
    pub(crate) fn new(shared: Arc<CollectionShared>, catalog: Weak<Catalog>) -> Self {
        Self { shared, catalog }
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Tuning fixed at creation.
    #[must_use]
    pub fn options(&self) -> CollectionOptions {
        self.shared.options
    }

    fn live(&self) -> CoreResult<Arc<Catalog>> {
        let catalog = self.catalog.upgrade().ok_or(CoreError::DatabaseClosed)?;
        if !catalog.is_open() {
            return Err(CoreError::DatabaseClosed);
        }
        if self.shared.dropped.load(Ordering::SeqCst) {
            return Err(CoreError::collection_not_found(&self.shared.name));
        }
        Ok(catalog)
    }

    fn writable(&self) -> CoreResult<Arc<Catalog>> {
        let catalog = self.live()?;
        if catalog.config().open_mode.is_read_only() {
            return Err(CoreError::ReadOnly);
        }
        Ok(catalog)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CollectionState> {
        loop {
            self.shared.txn.wait_turn();
            let state = self.shared.state.read();
            if self.shared.txn.may_proceed() {
                return state;
            }
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CollectionState> {
        loop {
            self.shared.txn.wait_turn();
            let state = self.shared.state.write();
            if self.shared.txn.may_proceed() {
                return state;
            }
        }
    }

    /// Syncs after an auto-committed mutation when `TSYNC` is set.
    fn autocommit(&self, catalog: &Catalog, state: &mut CollectionState) -> CoreResult<()> {
        if state.rollback.is_none() && catalog.config().open_mode.contains(OpenMode::TSYNC) {
            state.log.sync()?;
        }
        Ok(())
    }

    /// Inserts a document and returns its id.
    ///
    /// # Errors
    ///
    /// - `TypeMismatch` if `_id` is neither an object id nor a valid hex id
    /// - `DuplicateKey` if a document with the same id exists
    pub fn insert(&self, doc: Document) -> CoreResult<ObjectId> {
        let catalog = self.writable()?;
        let mut doc = doc;
        let oid = assign_id(&mut doc)?;
        let mut state = self.write_state();
        state.insert_doc(oid, &doc)?;
        self.autocommit(&catalog, &mut state)?;
        debug!(collection = %self.shared.name, %oid, "document inserted");
        Ok(oid)
    }

    /// Inserts or replaces a document by `_id`. With `merge`, the fields of
    /// `doc` are copied over the stored document instead of replacing it.
    pub fn save(&self, doc: Document, merge: bool) -> CoreResult<ObjectId> {
        let catalog = self.writable()?;
        let mut doc = doc;
        let oid = assign_id(&mut doc)?;
        let mut state = self.write_state();
        match state.log.get(&oid)? {
            Some(old) => {
                let new = if merge {
                    let mut merged = (*old).clone();
                    merged.merge(&doc);
                    merged
                } else {
                    doc
                };
                state.replace(oid, &old, &new)?;
            }
            None => state.insert_doc(oid, &doc)?,
        }
        self.autocommit(&catalog, &mut state)?;
        Ok(oid)
    }

    /// Fetches a document by id. Absence is not an error.
    pub fn fetch(&self, oid: &ObjectId) -> CoreResult<Option<Document>> {
        self.live()?;
        let state = self.read_state();
        Ok(state.log.get(oid)?.map(Arc::unwrap_or_clone))
    }

    /// Removes a document by id.
    ///
    /// # Errors
    ///
    /// Returns `DocumentNotFound` if no such document exists.
    pub fn remove(&self, oid: &ObjectId) -> CoreResult<()> {
        let catalog = self.writable()?;
        let mut state = self.write_state();
        let old = state.log.get(oid)?.ok_or_else(|| CoreError::DocumentNotFound {
            collection: self.shared.name.clone(),
            oid: *oid,
        })?;
        state.delete(*oid, &old)?;
        self.autocommit(&catalog, &mut state)?;
        debug!(collection = %self.shared.name, %oid, "document removed");
        Ok(())
    }

    /// Number of documents.
    pub fn count(&self) -> CoreResult<u64> {
        self.live()?;
        Ok(self.read_state().log.len() as u64)
    }

    /// Forces buffered writes to stable storage and saves indexes.
    pub fn sync(&self) -> CoreResult<()> {
        let catalog = self.live()?;
        if catalog.config().open_mode.is_read_only() {
            return Ok(());
        }
        self.shared.txn.wait_turn();
        self.shared.sync(catalog.dir())
    }

    /// Rewrites the data log keeping only live documents.
    ///
    /// # Errors
    ///
    /// Returns `TransactionAlreadyActive` inside a transaction.
    pub fn compact(&self) -> CoreResult<CompactionStats> {
        let catalog = self.writable()?;
        let mut state = self.write_state();
        if state.rollback.is_some() {
            return Err(CoreError::TransactionAlreadyActive {
                collection: self.shared.name.clone(),
            });
        }
        let stats = state.log.compact()?;
        persist_indexes(&self.shared.name, &state, catalog.dir())?;
        info!(
            collection = %self.shared.name,
            before = stats.bytes_before,
            after = stats.bytes_after,
            "data log compacted"
        );
        Ok(stats)
    }

    /// Creates, drops, rebuilds or optimizes indexes on `path`.
    ///
    /// # Errors
    ///
    /// Returns `IndexError` for an invalid request, for a nested document in
    /// a token-indexed field, or inside a transaction.
    pub fn set_index(&self, path: &str, request: &IndexRequest) -> CoreResult<()> {
        let catalog = self.writable()?;
        request.validate(path)?;
        let mut guard = self.write_state();
        let state = &mut *guard;
        if state.rollback.is_some() {
            return Err(CoreError::index_error(
                path,
                "indexes cannot change inside a transaction",
            ));
        }
        let log = &state.log;
        let changes = state.indexes.apply(path, request, || load_all(log))?;
        if changes.is_empty() {
            return Ok(());
        }

        if let Some(dir) = catalog.dir() {
            let size = state.log.size()?;
            for (kind, change) in &changes {
                match (change, state.indexes.get(path, *kind)) {
                    (IndexChange::Dropped, _) => dir.remove_index(&self.shared.name, path, *kind)?,
                    (_, Some(index)) => {
                        dir.save_index(&self.shared.name, path, *kind, &encode_index(index, size))?;
                    }
                    (_, None) => {}
                }
            }
        }
        *self.shared.index_defs.lock() = state
            .indexes
            .iter()
            .map(|i| (i.path().to_string(), i.kind()))
            .collect();
        drop(guard);

        if changes
            .iter()
            .any(|(_, c)| matches!(c, IndexChange::Created | IndexChange::Dropped))
        {
            catalog.save_manifest()?;
        }
        Ok(())
    }

    /// Current indexes.
    pub fn indexes(&self) -> CoreResult<Vec<IndexInfo>> {
        self.live()?;
        Ok(self.read_state().indexes.infos())
    }

    /// Runs `query` and returns every match.
    pub fn find(&self, query: &Query) -> CoreResult<QueryResult> {
        self.execute(query, QueryMode::Find, &QueryOptions::new())
    }

    /// Runs `query` and returns the first match.
    pub fn find_one(&self, query: &Query) -> CoreResult<Option<Document>> {
        let result = self.execute(query, QueryMode::FindOne, &QueryOptions::new())?;
        Ok(result.documents.into_iter().next())
    }

    /// Counts the documents matching `query`.
    pub fn count_matching(&self, query: &Query) -> CoreResult<u64> {
        Ok(self
            .execute(query, QueryMode::Count, &QueryOptions::new())?
            .count)
    }

    /// Runs an update-bearing query and returns the number of documents
    /// matched and processed.
    pub fn update(&self, query: &Query) -> CoreResult<u64> {
        Ok(self
            .execute(query, QueryMode::Count, &QueryOptions::new())?
            .count)
    }

    /// Distinct values found at `path` in the documents matching `query`.
    pub fn distinct(&self, path: &str, query: &Query) -> CoreResult<Vec<Value>> {
        self.live()?;
        let state = self.read_state();
        let hits = exec::select(query, &*state, QueryMode::Find, &mut QueryLog::default())?
            .into_window();
        Ok(exec::distinct(path, &hits))
    }

    /// Runs `query` in `mode`.
    ///
    /// Update-bearing queries are applied atomically: outside a transaction
    /// either every matched document is written or none is.
    pub fn execute(
        &self,
        query: &Query,
        mode: QueryMode,
        options: &QueryOptions,
    ) -> CoreResult<QueryResult> {
        let catalog = if query.is_update() {
            self.writable()?
        } else {
            self.live()?
        };
        let mut log = QueryLog::new(options.log_enabled());

        let (docs, count) = if query.is_update() {
            let mut guard = self.write_state();
            let state = &mut *guard;
            let selection = exec::select(query, &*state, mode, &mut log)?;
            let processed = if state.rollback.is_some() {
                exec::mutate(query, state, selection, &mut log)?
            } else {
                let sync = catalog.config().open_mode.contains(OpenMode::TSYNC);
                atomically(state, sync, |s| exec::mutate(query, s, selection, &mut log))?
            };
            let count = processed.len() as u64;
            (processed, count)
        } else {
            let state = self.read_state();
            let hits = exec::select(query, &*state, mode, &mut log)?.into_window();
            let count = hits.len() as u64;
            let docs = if mode == QueryMode::Count {
                Vec::new()
            } else {
                hits.into_iter().map(|(_, d): Hit| Arc::unwrap_or_clone(d)).collect()
            };
            (docs, count)
        };

        let documents = if mode == QueryMode::Count {
            Vec::new()
        } else {
            query.finish(docs, |name, oid| catalog.lookup(name, oid))?
        };
        log.line(format!("RS SIZE: {}", documents.len()));
        Ok(QueryResult {
            documents,
            count,
            log: log.into_text(),
        })
    }

    /// Starts a transaction owned by the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `TransactionAlreadyActive` if any transaction is active on
    /// this collection.
    pub fn begin_transaction(&self) -> CoreResult<TransactionId> {
        self.writable()?;
        let mut state = self.shared.state.write();
        let id = self
            .shared
            .txn
            .try_begin()
            .ok_or_else(|| CoreError::TransactionAlreadyActive {
                collection: self.shared.name.clone(),
            })?;
        let snapshot = state.log.begin_batch();
        let indexes = state.indexes.clone();
        state.rollback = Some(Rollback::new(id, snapshot, indexes));
        info!(collection = %self.shared.name, txid = %id, "transaction started");
        Ok(id)
    }

    /// Takes the active transaction's rollback state. `id` selects the
    /// transaction directly; without it the calling thread must own it.
    fn take_rollback(
        &self,
        state: &mut CollectionState,
        id: Option<TransactionId>,
    ) -> CoreResult<Rollback> {
        let owned = match id {
            Some(id) => state.rollback.as_ref().is_some_and(|r| r.id() == id),
            None => self.shared.txn.owned_by_current(),
        };
        if !owned {
            return Err(CoreError::NoActiveTransaction {
                collection: self.shared.name.clone(),
            });
        }
        state.rollback.take().ok_or_else(|| CoreError::NoActiveTransaction {
            collection: self.shared.name.clone(),
        })
    }

    /// Writes the active transaction's mutations as one batch.
    ///
    /// If the write fails the transaction is rolled back and the error
    /// returned.
    pub fn commit_transaction(&self) -> CoreResult<()> {
        self.finish_commit(None)
    }

    /// Discards the active transaction's mutations, restoring documents and
    /// indexes to their state at `begin`.
    pub fn abort_transaction(&self) -> CoreResult<()> {
        self.finish_abort(None)
    }

    /// Commits transaction `id` from whichever thread holds its guard.
    pub(crate) fn commit_by_id(&self, id: TransactionId) -> CoreResult<()> {
        self.finish_commit(Some(id))
    }

    /// Aborts transaction `id` from whichever thread holds its guard.
    pub(crate) fn abort_by_id(&self, id: TransactionId) -> CoreResult<()> {
        self.finish_abort(Some(id))
    }

    fn finish_commit(&self, id: Option<TransactionId>) -> CoreResult<()> {
        let catalog = self.live()?;
        let mut state = self.shared.state.write();
        let rollback = self.take_rollback(&mut state, id)?;
        let id = rollback.id();
        let writes = rollback.write_count();

        if let Err(err) = state.log.commit_batch(catalog.config().syncs_on_commit()) {
            warn!(collection = %self.shared.name, txid = %id, error = %err, "commit failed, rolling back");
            restore(&mut state, rollback);
            self.shared.txn.end(id);
            return Err(err);
        }
        self.shared.txn.end(id);
        if let Err(err) = persist_indexes(&self.shared.name, &state, catalog.dir()) {
            warn!(collection = %self.shared.name, error = %err, "failed to save indexes after commit");
        }
        info!(collection = %self.shared.name, txid = %id, writes, "transaction committed");
        Ok(())
    }

    fn finish_abort(&self, id: Option<TransactionId>) -> CoreResult<()> {
        self.live()?;
        let mut state = self.shared.state.write();
        let rollback = self.take_rollback(&mut state, id)?;
        let id = rollback.id();
        restore(&mut state, rollback);
        self.shared.txn.end(id);
        info!(collection = %self.shared.name, txid = %id, "transaction aborted");
        Ok(())
    }

    /// Whether a transaction is active on this collection, from any thread.
    #[must_use]
    pub fn is_transaction_active(&self) -> bool {
        self.shared.txn.active().is_some()
    }

    /// Runs `f` in a transaction: commits if it returns `Ok`, aborts if it
    /// returns `Err`.
    pub fn transaction<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Collection) -> CoreResult<T>,
    {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_transaction() {
                    warn!(collection = %self.shared.name, error = %abort_err, "abort after failure");
                }
                Err(err)
            }
        }
    }

    /// Starts a transaction that aborts when the guard is dropped unless
    /// committed.
    pub fn begin_scoped(&self) -> CoreResult<TransactionGuard> {
        let id = self.begin_transaction()?;
        Ok(TransactionGuard::new(self.clone(), id))
    }

    pub(crate) fn active_transaction(&self) -> Option<TransactionId> {
        self.shared.txn.active()
    }
}

/// Runs `f` with the data log buffering, writing all of its records as one
/// batch. On any error the log and indexes are restored.
fn atomically<T, F>(state: &mut CollectionState, sync: bool, f: F) -> CoreResult<T>
where
    F: FnOnce(&mut CollectionState) -> CoreResult<T>,
{
    let snapshot = state.log.begin_batch();
    let indexes = state.indexes.clone();
    let result = match f(state) {
        Ok(value) => state.log.commit_batch(sync).map(|_| value),
        Err(err) => Err(err),
    };
    if result.is_err() {
        state.log.abort_batch(snapshot);
        state.indexes = indexes;
    }
    result
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

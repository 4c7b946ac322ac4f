//! Append-only data log holding one collection's documents.
//!
//! Every write appends a [`LogRecord`]; the newest record for an identifier
//! wins. The `oid -> offset` map is rebuilt by scanning the log at open.
//! Records written by a committed transaction are flagged as a batch, and a
//! batch without its closing record is discarded at open, so a crash in the
//! middle of a commit leaves none of it visible.

use crate::collection::record::{Decoded, LogRecord, RecordFlags};
use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;
use docudb_codec::{decode_document, encode_document, Document, ObjectId};
use docudb_storage::StorageBackend;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Location of the current version of a document.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    /// Written to the log at `offset`.
    Stored {
        /// Byte offset of the record.
        offset: u64,
        /// Encoded record length.
        len: u32,
    },
    /// Buffered by an active transaction.
    Pending(Arc<Document>),
}

/// State captured at the start of a transaction batch.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogSnapshot {
    entries: BTreeMap<ObjectId, Slot>,
    next_seq: SequenceNumber,
}

/// Summary of a compaction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Live records rewritten.
    pub records: usize,
}

/// Bounded FIFO cache of decoded documents keyed by record offset.
#[derive(Debug)]
struct DocumentCache {
    capacity: usize,
    docs: HashMap<u64, Arc<Document>>,
    order: VecDeque<u64>,
}

impl DocumentCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            docs: HashMap::with_capacity(capacity.min(4096)),
            order: VecDeque::new(),
        }
    }

    fn get(&self, offset: u64) -> Option<Arc<Document>> {
        self.docs.get(&offset).cloned()
    }

    fn insert(&mut self, offset: u64, doc: Arc<Document>) {
        if self.capacity == 0 || self.docs.contains_key(&offset) {
            return;
        }
        while self.docs.len() >= self.capacity {
            match self.order.pop_front() {
                Some(old) => {
                    self.docs.remove(&old);
                }
                None => break,
            }
        }
        self.docs.insert(offset, doc);
        self.order.push_back(offset);
    }

    fn clear(&mut self) {
        self.docs.clear();
        self.order.clear();
    }
}

/// The data log of one collection.
pub(crate) struct DataLog {
    backend: Box<dyn StorageBackend>,
    entries: BTreeMap<ObjectId, Slot>,
    next_seq: SequenceNumber,
    cache: Mutex<DocumentCache>,
    batch: Option<Vec<LogRecord>>,
}

impl DataLog {
    /// Opens a log over `backend`, rebuilding the identifier map by scanning.
    ///
    /// A torn trailing record, or a trailing transaction batch without its
    /// closing record, is truncated away (unless the backend is read-only).
    pub(crate) fn open(backend: Box<dyn StorageBackend>, cached_records: usize) -> CoreResult<Self> {
        let mut log = Self {
            backend,
            entries: BTreeMap::new(),
            next_seq: SequenceNumber::new(1),
            cache: Mutex::new(DocumentCache::new(cached_records)),
            batch: None,
        };
        log.rebuild()?;
        Ok(log)
    }

    fn rebuild(&mut self) -> CoreResult<()> {
        let data = self.backend.read_all()?;
        let mut entries = BTreeMap::new();
        let mut staged: Vec<(LogRecord, u64, u32)> = Vec::new();
        let mut offset = 0usize;
        let mut committed_end = 0usize;
        let mut last_seq = SequenceNumber::default();

        while offset < data.len() {
            let (record, len) = match LogRecord::decode(&data[offset..])? {
                Decoded::Record(record, len) => (record, len),
                Decoded::Torn => break,
            };
            let at = offset as u64;
            let len32 = u32::try_from(len).unwrap_or(u32::MAX);
            offset += len;
            last_seq = last_seq.max(record.sequence);

            if record.flags.contains(RecordFlags::BATCH) {
                let end = record.flags.contains(RecordFlags::BATCH_END);
                staged.push((record, at, len32));
                if end {
                    for (record, at, len) in staged.drain(..) {
                        apply_scanned(&mut entries, &record, at, len);
                    }
                    committed_end = offset;
                }
            } else {
                if !staged.is_empty() {
                    return Err(CoreError::invalid_format(
                        "transaction batch interrupted by a plain record",
                    ));
                }
                apply_scanned(&mut entries, &record, at, len32);
                committed_end = offset;
            }
        }

        if committed_end < data.len() {
            warn!(
                discarded = data.len() - committed_end,
                "data log ends with an incomplete record or batch"
            );
            if !self.backend.is_read_only() {
                self.backend.truncate(committed_end as u64)?;
            }
        }

        debug!(records = entries.len(), bytes = committed_end, "data log scanned");
        self.entries = entries;
        self.next_seq = last_seq.next();
        Ok(())
    }

    /// Number of live documents.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether a live document has this identifier.
    pub(crate) fn contains(&self, oid: &ObjectId) -> bool {
        self.entries.contains_key(oid)
    }

    /// Live identifiers in ascending order.
    pub(crate) fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries.keys().copied()
    }

    /// Current size of the underlying log in bytes.
    pub(crate) fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Reads the current version of a document.
    pub(crate) fn get(&self, oid: &ObjectId) -> CoreResult<Option<Arc<Document>>> {
        match self.entries.get(oid) {
            None => Ok(None),
            Some(slot) => self.read_slot(slot).map(Some),
        }
    }

    /// Reads a document as it was when `snapshot` was taken, ignoring
    /// writes buffered since.
    pub(crate) fn get_committed(
        &self,
        snapshot: &LogSnapshot,
        oid: &ObjectId,
    ) -> CoreResult<Option<Arc<Document>>> {
        match snapshot.entries.get(oid) {
            None => Ok(None),
            Some(slot) => self.read_slot(slot).map(Some),
        }
    }

    fn read_slot(&self, slot: &Slot) -> CoreResult<Arc<Document>> {
        let (offset, len) = match slot {
            Slot::Pending(doc) => return Ok(Arc::clone(doc)),
            Slot::Stored { offset, len } => (*offset, *len),
        };
        if let Some(doc) = self.cache.lock().get(offset) {
            return Ok(doc);
        }
        let bytes = self.backend.read_at(offset, len as usize)?;
        let record = match LogRecord::decode(&bytes)? {
            Decoded::Record(record, _) => record,
            Decoded::Torn => {
                return Err(CoreError::invalid_format(format!(
                    "record at offset {offset} is incomplete"
                )))
            }
        };
        let doc = Arc::new(decode_document(&record.payload)?);
        self.cache.lock().insert(offset, Arc::clone(&doc));
        Ok(doc)
    }

    /// Writes a new version of a document.
    pub(crate) fn put(&mut self, oid: ObjectId, doc: &Document) -> CoreResult<()> {
        let payload = encode_document(doc)?;
        let record = LogRecord::put(oid, payload, self.take_seq());
        if let Some(batch) = self.batch.as_mut() {
            batch.push(record);
            self.entries.insert(oid, Slot::Pending(Arc::new(doc.clone())));
            return Ok(());
        }
        let encoded = record.encode();
        let offset = self.backend.append(&encoded)?;
        let len = u32::try_from(encoded.len()).unwrap_or(u32::MAX);
        self.cache.lock().insert(offset, Arc::new(doc.clone()));
        self.entries.insert(oid, Slot::Stored { offset, len });
        Ok(())
    }

    /// Removes a document by appending a tombstone.
    pub(crate) fn remove(&mut self, oid: ObjectId) -> CoreResult<()> {
        let record = LogRecord::tombstone(oid, self.take_seq());
        match self.batch.as_mut() {
            Some(batch) => batch.push(record),
            None => {
                self.backend.append(&record.encode())?;
            }
        }
        self.entries.remove(&oid);
        Ok(())
    }

    fn take_seq(&mut self) -> SequenceNumber {
        let seq = self.next_seq;
        self.next_seq = seq.next();
        seq
    }

    /// Starts buffering writes and returns the state to restore on abort.
    pub(crate) fn begin_batch(&mut self) -> LogSnapshot {
        self.batch = Some(Vec::new());
        LogSnapshot {
            entries: self.entries.clone(),
            next_seq: self.next_seq,
        }
    }

    /// Writes every buffered record as one append.
    ///
    /// On failure the file is cut back to where the batch started and the
    /// buffer is kept, so the caller can still abort. If the cut itself
    /// fails the batch stays in the file and is treated as committed.
    pub(crate) fn commit_batch(&mut self, sync: bool) -> CoreResult<usize> {
        let mut records = self.batch.take().unwrap_or_default();
        if records.is_empty() {
            return Ok(0);
        }
        let last = records.len() - 1;
        for (i, record) in records.iter_mut().enumerate() {
            record.flags = record.flags.with(RecordFlags::BATCH);
            if i == last {
                record.flags = record.flags.with(RecordFlags::BATCH_END);
            }
        }

        let mut buf = Vec::with_capacity(records.iter().map(LogRecord::encoded_size).sum());
        for record in &records {
            record.encode_into(&mut buf);
        }
        let base = match self.backend.append(&buf) {
            Ok(base) => base,
            Err(err) => {
                self.batch = Some(records);
                return Err(err.into());
            }
        };
        let written = if sync {
            self.backend.sync()
        } else {
            self.backend.flush()
        };
        if let Err(err) = written {
            // Remove the unsynced batch before reporting the failure.
            match self.backend.truncate(base) {
                Ok(()) => {
                    self.batch = Some(records);
                    return Err(err.into());
                }
                Err(truncate_err) => warn!(
                    error = %err,
                    truncate_error = %truncate_err,
                    "batch written but not synced; keeping it committed"
                ),
            }
        }

        let mut offset = base;
        for record in &records {
            let len = record.encoded_size();
            if !record.is_tombstone() && self.entries.contains_key(&record.oid) {
                self.entries.insert(
                    record.oid,
                    Slot::Stored {
                        offset,
                        len: u32::try_from(len).unwrap_or(u32::MAX),
                    },
                );
            }
            offset += len as u64;
        }
        Ok(records.len())
    }

    /// Drops buffered records and restores the state captured at begin.
    pub(crate) fn abort_batch(&mut self, snapshot: LogSnapshot) -> usize {
        let discarded = self.batch.take().map_or(0, |b| b.len());
        self.entries = snapshot.entries;
        self.next_seq = snapshot.next_seq;
        discarded
    }

    /// Flushes buffered bytes to the OS.
    pub(crate) fn flush(&mut self) -> CoreResult<()> {
        self.backend.flush()?;
        Ok(())
    }

    /// Forces written records to stable storage.
    pub(crate) fn sync(&mut self) -> CoreResult<()> {
        self.backend.sync()?;
        Ok(())
    }

    /// Rewrites the log so it holds only the current version of each live
    /// document. The new log replaces the old one in a single step; on
    /// error the old log and the identifier map are left untouched.
    pub(crate) fn compact(&mut self) -> CoreResult<CompactionStats> {
        let bytes_before = self.backend.size()?;
        let mut live = Vec::with_capacity(self.entries.len());
        for (oid, slot) in &self.entries {
            let Slot::Stored { offset, len } = *slot else {
                return Err(CoreError::invalid_format(
                    "cannot compact while a transaction is buffering writes",
                ));
            };
            live.push((*oid, self.backend.read_at(offset, len as usize)?));
        }

        let mut buf = Vec::with_capacity(live.iter().map(|(_, b)| b.len()).sum());
        let mut entries = BTreeMap::new();
        for (oid, bytes) in live {
            let Decoded::Record(mut record, _) = LogRecord::decode(&bytes)? else {
                return Err(CoreError::invalid_format("torn record inside the log"));
            };
            // Rewritten records stand alone, outside any batch.
            record.flags = RecordFlags::NONE;
            let start = buf.len();
            record.encode_into(&mut buf);
            entries.insert(
                oid,
                Slot::Stored {
                    offset: start as u64,
                    len: u32::try_from(buf.len() - start).unwrap_or(u32::MAX),
                },
            );
        }

        self.backend.replace_contents(&buf)?;
        self.cache.lock().clear();
        let records = entries.len();
        self.entries = entries;

        Ok(CompactionStats {
            bytes_before,
            bytes_after: buf.len() as u64,
            records,
        })
    }
}

fn apply_scanned(entries: &mut BTreeMap<ObjectId, Slot>, record: &LogRecord, offset: u64, len: u32) {
    if record.is_tombstone() {
        entries.remove(&record.oid);
    } else {
        entries.insert(record.oid, Slot::Stored { offset, len });
    }
}

impl std::fmt::Debug for DataLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLog")
            .field("records", &self.entries.len())
            .field("next_seq", &self.next_seq)
            .field("batching", &self.batch.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docudb_storage::{InMemoryBackend, StorageError, StorageResult};
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Switches that make [`FaultyBackend`] fail on demand.
    #[derive(Default)]
    struct Faults {
        sync: AtomicBool,
        replace: AtomicBool,
    }

    fn injected(what: &str) -> StorageError {
        StorageError::Io(io::Error::other(format!("injected {what} failure")))
    }

    struct FaultyBackend {
        inner: InMemoryBackend,
        faults: Arc<Faults>,
    }

    impl StorageBackend for FaultyBackend {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }

        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            self.inner.append(data)
        }

        fn flush(&mut self) -> StorageResult<()> {
            self.inner.flush()
        }

        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }

        fn sync(&mut self) -> StorageResult<()> {
            if self.faults.sync.load(Ordering::SeqCst) {
                return Err(injected("sync"));
            }
            self.inner.sync()
        }

        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            self.inner.truncate(new_size)
        }

        fn replace_contents(&mut self, data: &[u8]) -> StorageResult<()> {
            if self.faults.replace.load(Ordering::SeqCst) {
                return Err(injected("replace"));
            }
            self.inner.replace_contents(data)
        }
    }

    fn open_faulty() -> (DataLog, Arc<Faults>) {
        let faults = Arc::new(Faults::default());
        let backend = FaultyBackend {
            inner: InMemoryBackend::new(),
            faults: Arc::clone(&faults),
        };
        (DataLog::open(Box::new(backend), 16).unwrap(), faults)
    }

    fn doc(n: i64) -> Document {
        Document::new().with("n", n)
    }

    fn open(data: Vec<u8>) -> DataLog {
        DataLog::open(Box::new(InMemoryBackend::with_data(data)), 16).unwrap()
    }

    fn raw(log: &DataLog) -> Vec<u8> {
        log.backend.read_all().unwrap()
    }

    #[test]
    fn put_get_remove() {
        let mut log = open(Vec::new());
        let oid = ObjectId::new();
        log.put(oid, &doc(1)).unwrap();
        assert_eq!(log.get(&oid).unwrap().as_deref(), Some(&doc(1)));

        log.put(oid, &doc(2)).unwrap();
        assert_eq!(log.get(&oid).unwrap().as_deref(), Some(&doc(2)));
        assert_eq!(log.len(), 1);

        log.remove(oid).unwrap();
        assert!(log.get(&oid).unwrap().is_none());
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn reopen_replays_latest_versions() {
        let mut log = open(Vec::new());
        let a = ObjectId::new();
        let b = ObjectId::new();
        log.put(a, &doc(1)).unwrap();
        log.put(b, &doc(2)).unwrap();
        log.put(a, &doc(3)).unwrap();
        log.remove(b).unwrap();

        let reopened = open(raw(&log));
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(&a).unwrap().as_deref(), Some(&doc(3)));
        assert!(reopened.next_seq > SequenceNumber::new(4));
    }

    #[test]
    fn torn_tail_is_truncated() {
        let mut log = open(Vec::new());
        let oid = ObjectId::new();
        log.put(oid, &doc(1)).unwrap();
        let good = raw(&log).len();
        log.put(ObjectId::new(), &doc(2)).unwrap();
        let mut data = raw(&log);
        data.truncate(data.len() - 3);

        let reopened = open(data);
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.size().unwrap(), good as u64);
    }

    #[test]
    fn corrupt_record_is_fatal() {
        let mut log = open(Vec::new());
        log.put(ObjectId::new(), &doc(1)).unwrap();
        let mut data = raw(&log);
        data[LogRecord::HEADER_SIZE + 2] ^= 0xFF;

        let result = DataLog::open(Box::new(InMemoryBackend::with_data(data)), 0);
        assert!(matches!(result, Err(CoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn batch_commit_is_visible_after_reopen() {
        let mut log = open(Vec::new());
        let _ = log.begin_batch();
        let a = ObjectId::new();
        log.put(a, &doc(1)).unwrap();
        log.put(ObjectId::new(), &doc(2)).unwrap();
        assert_eq!(log.size().unwrap(), 0);
        assert_eq!(log.commit_batch(false).unwrap(), 2);

        let reopened = open(raw(&log));
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get(&a).unwrap().as_deref(), Some(&doc(1)));
    }

    #[test]
    fn incomplete_batch_is_discarded_at_open() {
        let mut log = open(Vec::new());
        log.put(ObjectId::new(), &doc(0)).unwrap();
        let committed = raw(&log).len();

        let _ = log.begin_batch();
        log.put(ObjectId::new(), &doc(1)).unwrap();
        log.put(ObjectId::new(), &doc(2)).unwrap();
        log.commit_batch(false).unwrap();

        let mut data = raw(&log);
        // Drop the closing record of the batch.
        let last = LogRecord::HEADER_SIZE + encode_document(&doc(2)).unwrap().len() + 4;
        data.truncate(data.len() - last);

        let reopened = open(data);
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.size().unwrap(), committed as u64);
    }

    #[test]
    fn abort_restores_entries() {
        let mut log = open(Vec::new());
        let keep = ObjectId::new();
        log.put(keep, &doc(1)).unwrap();

        let snapshot = log.begin_batch();
        log.put(keep, &doc(9)).unwrap();
        log.put(ObjectId::new(), &doc(2)).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.abort_batch(snapshot), 2);

        assert_eq!(log.len(), 1);
        assert_eq!(log.get(&keep).unwrap().as_deref(), Some(&doc(1)));
    }

    #[test]
    fn compact_keeps_live_documents_only() {
        let mut log = open(Vec::new());
        let a = ObjectId::new();
        for i in 0..10 {
            log.put(a, &doc(i)).unwrap();
        }
        let gone = ObjectId::new();
        log.put(gone, &doc(100)).unwrap();
        log.remove(gone).unwrap();

        let stats = log.compact().unwrap();
        assert_eq!(stats.records, 1);
        assert!(stats.bytes_after < stats.bytes_before);
        assert_eq!(log.get(&a).unwrap().as_deref(), Some(&doc(9)));

        let reopened = open(raw(&log));
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(&a).unwrap().as_deref(), Some(&doc(9)));
    }

    #[test]
    fn compact_after_batch_survives_reopen() {
        let mut log = open(Vec::new());
        let _ = log.begin_batch();
        let (a, b) = (ObjectId::new(), ObjectId::new());
        log.put(a, &doc(1)).unwrap();
        log.put(b, &doc(2)).unwrap();
        log.commit_batch(false).unwrap();
        log.remove(b).unwrap();
        log.compact().unwrap();

        let reopened = open(raw(&log));
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(&a).unwrap().as_deref(), Some(&doc(1)));
    }

    #[test]
    fn failed_compaction_keeps_the_old_log() {
        let (mut log, faults) = open_faulty();
        let a = ObjectId::new();
        for i in 0..5 {
            log.put(a, &doc(i)).unwrap();
        }
        let before = raw(&log);

        faults.replace.store(true, Ordering::SeqCst);
        assert!(log.compact().is_err());
        assert_eq!(raw(&log), before);
        assert_eq!(log.get(&a).unwrap().as_deref(), Some(&doc(4)));

        faults.replace.store(false, Ordering::SeqCst);
        let stats = log.compact().unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(log.get(&a).unwrap().as_deref(), Some(&doc(4)));
        assert_eq!(open(raw(&log)).len(), 1);
    }

    #[test]
    fn unsynced_batch_is_cut_from_the_log() {
        let (mut log, faults) = open_faulty();
        let kept = ObjectId::new();
        log.put(kept, &doc(0)).unwrap();
        let committed = raw(&log);

        let snapshot = log.begin_batch();
        log.put(ObjectId::new(), &doc(1)).unwrap();
        faults.sync.store(true, Ordering::SeqCst);
        assert!(log.commit_batch(true).is_err());
        assert_eq!(raw(&log), committed);

        assert_eq!(log.abort_batch(snapshot), 1);
        assert_eq!(log.len(), 1);
        let reopened = open(raw(&log));
        assert_eq!(reopened.len(), 1);
        assert!(reopened.contains(&kept));
    }

    #[test]
    fn cache_is_bounded() {
        let mut cache = DocumentCache::new(2);
        for offset in 0..5 {
            cache.insert(offset, Arc::new(doc(offset as i64)));
        }
        assert_eq!(cache.docs.len(), 2);
        assert!(cache.get(4).is_some());
        assert!(cache.get(0).is_none());
    }
}

//! Ordered index over one (field path, kind) pair.

use crate::error::CoreResult;
use crate::index::key::{document_keys, IndexKey, IndexKind};
use docudb_codec::{Document, ObjectId};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Secondary index mapping keys to the documents that hold them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldIndex {
    path: String,
    kind: IndexKind,
    entries: BTreeMap<IndexKey, BTreeSet<ObjectId>>,
    count: usize,
}

impl FieldIndex {
    pub(crate) fn new(path: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            path: path.into(),
            kind,
            entries: BTreeMap::new(),
            count: 0,
        }
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) const fn kind(&self) -> IndexKind {
        self.kind
    }

    /// Number of (key, document) pairs.
    pub(crate) const fn len(&self) -> usize {
        self.count
    }

    pub(crate) fn entries(&self) -> &BTreeMap<IndexKey, BTreeSet<ObjectId>> {
        &self.entries
    }

    fn add(&mut self, key: IndexKey, oid: ObjectId) {
        if self.entries.entry(key).or_default().insert(oid) {
            self.count += 1;
        }
    }

    fn retract(&mut self, key: &IndexKey, oid: &ObjectId) {
        if let Some(set) = self.entries.get_mut(key) {
            if set.remove(oid) {
                self.count -= 1;
            }
            if set.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Adds every key of `doc`. Nested documents under a token index are
    /// skipped.
    pub(crate) fn insert_doc(&mut self, oid: ObjectId, doc: &Document) {
        if let Ok(keys) = document_keys(self.kind, &self.path, doc, false) {
            for key in keys {
                self.add(key, oid);
            }
        }
    }

    /// Retracts every key of `doc`.
    pub(crate) fn remove_doc(&mut self, oid: ObjectId, doc: &Document) {
        if let Ok(keys) = document_keys(self.kind, &self.path, doc, false) {
            for key in &keys {
                self.retract(key, &oid);
            }
        }
    }

    /// Recomputes the index from scratch.
    ///
    /// Fails without modifying the index if any document holds a value this
    /// kind cannot index.
    pub(crate) fn rebuild<'a, I>(&mut self, docs: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = (ObjectId, &'a Document)>,
    {
        let mut fresh = Self::new(self.path.clone(), self.kind);
        for (oid, doc) in docs {
            for key in document_keys(self.kind, &self.path, doc, true)? {
                fresh.add(key, oid);
            }
        }
        *self = fresh;
        Ok(())
    }

    /// Repacks the key map, dropping any empty buckets.
    pub(crate) fn optimize(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries.into_iter().filter(|(_, s)| !s.is_empty()).collect();
        self.count = self.entries.values().map(BTreeSet::len).sum();
    }

    pub(crate) fn lookup_eq(&self, key: &IndexKey) -> BTreeSet<ObjectId> {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    pub(crate) fn lookup_range(
        &self,
        low: Bound<&IndexKey>,
        high: Bound<&IndexKey>,
    ) -> BTreeSet<ObjectId> {
        if range_is_empty(low, high) {
            return BTreeSet::new();
        }
        self.entries
            .range::<IndexKey, _>((low, high))
            .flat_map(|(_, oids)| oids.iter().copied())
            .collect()
    }

    pub(crate) fn lookup_prefix(&self, prefix: &str) -> BTreeSet<ObjectId> {
        let start = IndexKey::Text(prefix.to_string());
        self.entries
            .range::<IndexKey, _>((Bound::Included(&start), Bound::Unbounded))
            .take_while(|(key, _)| matches!(key, IndexKey::Text(t) if t.starts_with(prefix)))
            .flat_map(|(_, oids)| oids.iter().copied())
            .collect()
    }

    pub(crate) fn from_parts(
        path: String,
        kind: IndexKind,
        entries: BTreeMap<IndexKey, BTreeSet<ObjectId>>,
    ) -> Self {
        let count = entries.values().map(BTreeSet::len).sum();
        Self {
            path,
            kind,
            entries,
            count,
        }
    }
}

fn range_is_empty(low: Bound<&IndexKey>, high: Bound<&IndexKey>) -> bool {
    match (low, high) {
        (Bound::Included(l), Bound::Included(h)) => l > h,
        (Bound::Included(l) | Bound::Excluded(l), Bound::Excluded(h))
        | (Bound::Excluded(l), Bound::Included(h)) => l >= h,
        _ => false,
    }
}

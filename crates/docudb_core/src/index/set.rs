//! All secondary indexes of one collection.

use crate::error::CoreResult;
use crate::index::field::FieldIndex;
use crate::index::key::IndexKind;
use crate::index::request::{IndexAction, IndexInfo, IndexRequest};
use docudb_codec::{Document, ObjectId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Effect of an index request on one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexChange {
    Created,
    Dropped,
    Rebuilt,
    Optimized,
}

/// Indexes keyed by (field path, kind).
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct IndexSet {
    indexes: BTreeMap<(String, IndexKind), FieldIndex>,
}

impl IndexSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub(crate) fn get(&self, path: &str, kind: IndexKind) -> Option<&FieldIndex> {
        self.indexes.get(&(path.to_string(), kind))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &FieldIndex> {
        self.indexes.values()
    }

    /// Installs an index loaded from disk or built elsewhere.
    pub(crate) fn install(&mut self, index: FieldIndex) {
        self.indexes
            .insert((index.path().to_string(), index.kind()), index);
    }

    pub(crate) fn insert_doc(&mut self, oid: ObjectId, doc: &Document) {
        for index in self.indexes.values_mut() {
            index.insert_doc(oid, doc);
        }
    }

    pub(crate) fn remove_doc(&mut self, oid: ObjectId, doc: &Document) {
        for index in self.indexes.values_mut() {
            index.remove_doc(oid, doc);
        }
    }

    pub(crate) fn replace_doc(&mut self, oid: ObjectId, old: &Document, new: &Document) {
        self.remove_doc(oid, old);
        self.insert_doc(oid, new);
    }

    pub(crate) fn infos(&self) -> Vec<IndexInfo> {
        self.indexes
            .values()
            .map(|index| IndexInfo {
                field: index.path().to_string(),
                kind: index.kind(),
                records: index.len(),
            })
            .collect()
    }

    /// Executes a validated request.
    ///
    /// `load` is called at most once, only if an index has to be built. The
    /// set is left untouched if building any index fails.
    pub(crate) fn apply<F>(
        &mut self,
        path: &str,
        request: &IndexRequest,
        load: F,
    ) -> CoreResult<Vec<(IndexKind, IndexChange)>>
    where
        F: FnOnce() -> CoreResult<Vec<(ObjectId, Arc<Document>)>>,
    {
        let mut changes = Vec::new();
        match request.action {
            IndexAction::Drop | IndexAction::DropAll => {
                let kinds = if request.action == IndexAction::DropAll {
                    IndexKind::ALL.to_vec()
                } else {
                    request.distinct_kinds()
                };
                for kind in kinds {
                    if self.indexes.remove(&(path.to_string(), kind)).is_some() {
                        info!(field = path, %kind, "index dropped");
                        changes.push((kind, IndexChange::Dropped));
                    }
                }
            }
            IndexAction::Optimize => {
                for kind in request.distinct_kinds() {
                    if let Some(index) = self.indexes.get_mut(&(path.to_string(), kind)) {
                        index.optimize();
                        info!(field = path, %kind, "index optimized");
                        changes.push((kind, IndexChange::Optimized));
                    }
                }
            }
            IndexAction::Create | IndexAction::Rebuild => {
                let wanted: Vec<(IndexKind, IndexChange)> = request
                    .distinct_kinds()
                    .into_iter()
                    .filter_map(|kind| {
                        let exists = self.get(path, kind).is_some();
                        match (request.action, exists) {
                            (IndexAction::Create, true) => None,
                            (_, false) => Some((kind, IndexChange::Created)),
                            _ => Some((kind, IndexChange::Rebuilt)),
                        }
                    })
                    .collect();
                if wanted.is_empty() {
                    return Ok(changes);
                }

                let docs = load()?;
                let mut built = Vec::with_capacity(wanted.len());
                for (kind, change) in wanted {
                    let mut index = FieldIndex::new(path, kind);
                    index.rebuild(docs.iter().map(|(oid, doc)| (*oid, doc.as_ref())))?;
                    built.push((index, change));
                }
                for (index, change) in built {
                    info!(field = path, kind = %index.kind(), records = index.len(), ?change, "index built");
                    changes.push((index.kind(), change));
                    self.install(index);
                }
            }
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    fn docs() -> Vec<(ObjectId, Arc<Document>)> {
        (0..10)
            .map(|i| {
                (
                    ObjectId::new(),
                    Arc::new(Document::new().with("i", i).with("s", format!("v{i}"))),
                )
            })
            .collect()
    }

    #[test]
    fn create_builds_from_documents() {
        let data = docs();
        let mut set = IndexSet::new();
        let changes = set
            .apply("i", &IndexRequest::create(IndexKind::Number), || Ok(data.clone()))
            .unwrap();
        assert_eq!(changes, vec![(IndexKind::Number, IndexChange::Created)]);
        assert_eq!(set.get("i", IndexKind::Number).unwrap().len(), 10);

        // Creating again is a no-op and does not load documents.
        let changes = set
            .apply("i", &IndexRequest::create(IndexKind::Number), || {
                panic!("documents loaded for an existing index")
            })
            .unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn kinds_coexist_and_drop_individually() {
        let data = docs();
        let mut set = IndexSet::new();
        let both = IndexRequest::new(IndexAction::Create, [IndexKind::String, IndexKind::IString]);
        set.apply("s", &both, || Ok(data.clone())).unwrap();
        assert_eq!(set.infos().len(), 2);

        set.apply("s", &IndexRequest::drop_kind(IndexKind::String), || Ok(Vec::new()))
            .unwrap();
        assert!(set.get("s", IndexKind::String).is_none());
        assert!(set.get("s", IndexKind::IString).is_some());

        set.apply("s", &IndexRequest::drop_all(), || Ok(Vec::new())).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn drop_of_missing_index_is_noop() {
        let mut set = IndexSet::new();
        let changes = set
            .apply("x", &IndexRequest::drop_kind(IndexKind::Number), || Ok(Vec::new()))
            .unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn rebuild_twice_yields_identical_content() {
        let data = docs();
        let mut set = IndexSet::new();
        set.apply("i", &IndexRequest::create(IndexKind::Number), || Ok(data.clone()))
            .unwrap();
        set.apply("i", &IndexRequest::rebuild(IndexKind::Number), || Ok(data.clone()))
            .unwrap();
        let first = set.clone();
        set.apply("i", &IndexRequest::rebuild(IndexKind::Number), || Ok(data.clone()))
            .unwrap();
        assert_eq!(set, first);
    }

    #[test]
    fn maintenance_tracks_documents() {
        let mut set = IndexSet::new();
        set.apply("i", &IndexRequest::create(IndexKind::Number), || Ok(Vec::new()))
            .unwrap();
        let oid = ObjectId::new();
        let old = Document::new().with("i", 1);
        let new = Document::new().with("i", 2);
        set.insert_doc(oid, &old);
        set.replace_doc(oid, &old, &new);
        let index = set.get("i", IndexKind::Number).unwrap();
        assert_eq!(index.len(), 1);
        set.remove_doc(oid, &new);
        assert_eq!(set.get("i", IndexKind::Number).unwrap().len(), 0);
    }

    #[test]
    fn failed_create_has_no_effect() {
        let bad = vec![(
            ObjectId::new(),
            Arc::new(Document::from_json_str(r#"{"t": [{"x": 1}]}"#).unwrap()),
        )];
        let mut set = IndexSet::new();
        let request = IndexRequest::new(IndexAction::Create, [IndexKind::String, IndexKind::Array]);
        let result = set.apply("t", &request, || Ok(bad));
        assert!(matches!(result, Err(CoreError::IndexError { .. })));
        assert!(set.is_empty());
    }
}

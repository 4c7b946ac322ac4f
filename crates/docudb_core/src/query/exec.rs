//! Query execution against a document store.

use super::plan::Plan;
use super::{parse, update, Query, QueryLog, QueryMode};
use crate::error::CoreResult;
use crate::fieldpath;
use crate::index::IndexSet;
use docudb_codec::{Document, ObjectId, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// Read access to a collection's documents and indexes.
pub(crate) trait DocumentSource {
    /// Every live id, in id order.
    fn ids(&self) -> Vec<ObjectId>;
    fn load(&self, oid: &ObjectId) -> CoreResult<Option<Arc<Document>>>;
    fn index_set(&self) -> &IndexSet;
}

/// Write access used by update-bearing queries. Implementations keep
/// indexes in step with every call.
pub(crate) trait DocumentSink: DocumentSource {
    fn replace(&mut self, oid: ObjectId, old: &Document, new: &Document) -> CoreResult<()>;
    fn delete(&mut self, oid: ObjectId, old: &Document) -> CoreResult<()>;
    fn insert_new(&mut self, doc: Document) -> CoreResult<Document>;
}

/// A matched document with its id.
pub(crate) type Hit = (ObjectId, Arc<Document>);

/// Documents a query matched, in result order, before the `$skip`/`$max`
/// window is applied.
///
/// Update operators apply to every match; the window only shapes what is
/// reported back.
#[derive(Debug)]
pub(crate) struct Selection {
    matched: Vec<Hit>,
    skip: usize,
    max: Option<usize>,
}

impl Selection {
    /// Whether nothing matched at all.
    pub(crate) fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    /// Number of matches inside the window.
    pub(crate) fn window_len(&self) -> usize {
        let len = self.matched.len().saturating_sub(self.skip);
        self.max.map_or(len, |max| len.min(max))
    }

    /// The matches inside the window.
    pub(crate) fn into_window(self) -> Vec<Hit> {
        let (skip, max) = (self.skip, self.max);
        window(self.matched, skip, max)
    }
}

fn window<T>(items: Vec<T>, skip: usize, max: Option<usize>) -> Vec<T> {
    items
        .into_iter()
        .skip(skip)
        .take(max.unwrap_or(usize::MAX))
        .collect()
}

/// Finds the matching documents in result order.
///
/// Without `$orderby` the scan stops after `$skip + $max` matches.
pub(crate) fn select<S: DocumentSource + ?Sized>(
    query: &Query,
    source: &S,
    mode: QueryMode,
    log: &mut QueryLog,
) -> CoreResult<Selection> {
    let hints = &query.hints;
    let max = query.limit(mode);
    log.line(format!(
        "UPDATING MODE: {}",
        if query.is_update() { "YES" } else { "NO" }
    ));
    log.line(format!("MAX: {}", max.unwrap_or(0)));
    log.line(format!("SKIP: {}", hints.skip));
    log.line(format!(
        "COUNT ONLY: {}",
        if mode == QueryMode::Count { "YES" } else { "NO" }
    ));

    let plan = Plan::choose(
        &query.parsed.root,
        !query.alternatives.is_empty(),
        source.index_set(),
    );
    log.line(format!("MAIN IDX: {plan}"));
    log.line(format!("ORDER FIELDS: {}", hints.order_by.len()));
    log.line(format!("ROOT $OR QUERIES: {}", query.alternatives.len()));

    let candidates = match plan.candidates(source.index_set()) {
        Some(ids) => {
            if matches!(plan, Plan::ById(_)) {
                log.line("PRIMARY KEY MATCHING: TRUE");
            }
            ids.into_iter().collect()
        }
        None => {
            log.line("RUN FULLSCAN");
            source.ids()
        }
    };

    // Without sorting, stop once the window is full.
    let wanted = if hints.order_by.is_empty() {
        max.map(|m| m.saturating_add(hints.skip))
    } else {
        None
    };
    let mut hits = Vec::new();
    for oid in candidates {
        if wanted.is_some_and(|w| hits.len() >= w) {
            break;
        }
        let Some(doc) = source.load(&oid)? else {
            continue;
        };
        if query.matches(&doc) {
            hits.push((oid, doc));
        }
    }

    let sorting = !hints.order_by.is_empty() && hits.len() > 1;
    log.line(format!("FINAL SORTING: {}", if sorting { "YES" } else { "NO" }));
    if sorting {
        hits.sort_by(|(_, a), (_, b)| compare_by(&hints.order_by, a, b));
    }
    let selection = Selection {
        matched: hits,
        skip: hints.skip,
        max,
    };
    log.line(format!("RS COUNT: {}", selection.window_len()));
    Ok(selection)
}

fn compare_by(order: &[(String, bool)], a: &Document, b: &Document) -> Ordering {
    for (path, ascending) in order {
        let ord = match (a.get_path(path), b.get_path(path)) {
            (Some(x), Some(y)) => x.compare(y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        let ord = if *ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Applies the query's update operators to every selected document and
/// returns the windowed documents to report: updated versions, removed
/// documents under `$dropall`, or the inserted document for an `$upsert`
/// that matched nothing.
///
/// Every update is computed before anything is written, so an operator
/// failing on one document leaves all of them untouched.
pub(crate) fn mutate<S: DocumentSink + ?Sized>(
    query: &Query,
    sink: &mut S,
    selection: Selection,
    log: &mut QueryLog,
) -> CoreResult<Vec<Document>> {
    let spec = &query.parsed.update;

    if selection.is_empty() {
        if let Some(payload) = &spec.upsert {
            let doc = parse::upsert_document(&query.parsed.root, payload)?;
            let inserted = sink.insert_new(doc)?;
            if let Some(oid) = inserted.id() {
                log.line(format!("$UPSERT INSERTED: {oid}"));
            }
            return Ok(window(vec![inserted], selection.skip, selection.max));
        }
        return Ok(Vec::new());
    }
    let Selection { matched, skip, max } = selection;

    if spec.dropall {
        let mut removed = Vec::with_capacity(matched.len());
        for (oid, doc) in matched {
            log.line(format!("$DROPALL ON: {oid}"));
            sink.delete(oid, &doc)?;
            removed.push(Arc::unwrap_or_clone(doc));
        }
        return Ok(window(removed, skip, max));
    }

    let mut planned = Vec::with_capacity(matched.len());
    for (oid, doc) in matched {
        let updated = update::apply_update(spec, &doc)?;
        planned.push((oid, doc, updated));
    }
    let mut out = Vec::with_capacity(planned.len());
    for (oid, old, new) in planned {
        if *old != new {
            sink.replace(oid, &old, &new)?;
        }
        out.push(new);
    }
    Ok(window(out, skip, max))
}

/// Distinct values at `path` across `hits`, in order of first appearance.
/// Array values contribute their elements.
pub(crate) fn distinct(path: &str, hits: &[Hit]) -> Vec<Value> {
    let mut seen: Vec<Value> = Vec::new();
    for (_, doc) in hits {
        for value in fieldpath::resolve(doc, path) {
            let items = match value {
                Value::Array(items) => items.as_slice(),
                single => std::slice::from_ref(single),
            };
            for item in items {
                if !seen.iter().any(|s| s.loosely_equals(item)) {
                    seen.push(item.clone());
                }
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::index::{FieldIndex, IndexKind};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MemoryStore {
        docs: BTreeMap<ObjectId, Arc<Document>>,
        indexes: IndexSet,
    }

    impl MemoryStore {
        fn with_docs(jsons: &[&str]) -> Self {
            let mut store = Self::default();
            for json in jsons {
                store
                    .insert_new(Document::from_json_str(json).unwrap())
                    .unwrap();
            }
            store
        }
    }

    impl DocumentSource for MemoryStore {
        fn ids(&self) -> Vec<ObjectId> {
            self.docs.keys().copied().collect()
        }

        fn load(&self, oid: &ObjectId) -> CoreResult<Option<Arc<Document>>> {
            Ok(self.docs.get(oid).cloned())
        }

        fn index_set(&self) -> &IndexSet {
            &self.indexes
        }
    }

    impl DocumentSink for MemoryStore {
        fn replace(&mut self, oid: ObjectId, old: &Document, new: &Document) -> CoreResult<()> {
            self.indexes.replace_doc(oid, old, new);
            self.docs.insert(oid, Arc::new(new.clone()));
            Ok(())
        }

        fn delete(&mut self, oid: ObjectId, old: &Document) -> CoreResult<()> {
            self.indexes.remove_doc(oid, old);
            self.docs.remove(&oid);
            Ok(())
        }

        fn insert_new(&mut self, mut doc: Document) -> CoreResult<Document> {
            let oid = doc.id().unwrap_or_else(ObjectId::new);
            doc.set_id(oid);
            self.indexes.insert_doc(oid, &doc);
            self.docs.insert(oid, Arc::new(doc.clone()));
            Ok(doc)
        }
    }

    fn run(store: &mut MemoryStore, query: &Query, mode: QueryMode) -> Vec<Document> {
        let mut log = QueryLog::new(false);
        let selection = select(query, &*store, mode, &mut log).unwrap();
        if query.is_update() {
            mutate(query, store, selection, &mut log).unwrap()
        } else {
            selection
                .into_window()
                .into_iter()
                .map(|(_, d)| (*d).clone())
                .collect()
        }
    }

    fn names(docs: &[Document]) -> Vec<&str> {
        docs.iter()
            .map(|d| d.get("name").and_then(Value::as_str).unwrap_or(""))
            .collect()
    }

    const PEOPLE: [&str; 4] = [
        r#"{"name": "Bruce", "age": 58}"#,
        r#"{"name": "Clark", "age": 35}"#,
        r#"{"name": "Diana", "age": 5000}"#,
        r#"{"name": "Barry", "age": 28}"#,
    ];

    #[test]
    fn sorts_then_windows() {
        let mut store = MemoryStore::with_docs(&PEOPLE);
        let query = Query::parse_json("{}")
            .unwrap()
            .with_hints(Document::from_json_str(r#"{"$orderby": {"age": -1}, "$skip": 1, "$max": 2}"#).unwrap())
            .unwrap();
        let docs = run(&mut store, &query, QueryMode::Find);
        assert_eq!(names(&docs), vec!["Bruce", "Clark"]);
    }

    #[test]
    fn index_and_scan_agree() {
        let scanned = MemoryStore::with_docs(&PEOPLE);
        let mut indexed = MemoryStore::with_docs(&PEOPLE);
        let mut age = FieldIndex::new("age", IndexKind::Number);
        age.rebuild(indexed.docs.iter().map(|(o, d)| (*o, d.as_ref())))
            .unwrap();
        indexed.indexes.install(age);

        let query = Query::parse_json(r#"{"age": {"$gte": 30, "$lt": 100}}"#).unwrap();
        let mut log = QueryLog::new(true);
        let via_index = select(&query, &indexed, QueryMode::Find, &mut log)
            .unwrap()
            .into_window();
        let text = log.into_text().unwrap();
        assert!(text.contains("MAIN IDX: 'nage'"));
        assert!(!text.contains("RUN FULLSCAN"));

        let mut log = QueryLog::new(true);
        let via_scan = select(&query, &scanned, QueryMode::Find, &mut log)
            .unwrap()
            .into_window();
        assert!(log.into_text().unwrap().contains("RUN FULLSCAN"));
        assert_eq!(sorted_names(via_index), vec!["Bruce", "Clark"]);
        assert_eq!(sorted_names(via_scan), vec!["Bruce", "Clark"]);
    }

    #[test]
    fn orderby_keeps_index_plan() {
        let teams = [
            r#"{"name": "Clark", "team": "league"}"#,
            r#"{"name": "Bruce", "team": "league"}"#,
            r#"{"name": "Logan", "team": "xmen"}"#,
            r#"{"name": "Diana", "team": "league"}"#,
        ];
        let mut store = MemoryStore::with_docs(&teams);
        let mut team = FieldIndex::new("team", IndexKind::String);
        team.rebuild(store.docs.iter().map(|(o, d)| (*o, d.as_ref())))
            .unwrap();
        store.indexes.install(team);

        let query = Query::parse_json(r#"{"team": "league"}"#)
            .unwrap()
            .with_hints(Document::from_json_str(r#"{"$orderby": {"name": 1}}"#).unwrap())
            .unwrap();
        let mut log = QueryLog::new(true);
        let hits = select(&query, &store, QueryMode::Find, &mut log)
            .unwrap()
            .into_window();
        let text = log.into_text().unwrap();
        assert!(text.contains("MAIN IDX: 'steam'"));
        assert!(text.contains("FINAL SORTING: YES"));
        let docs: Vec<Document> = hits.into_iter().map(|(_, d)| (*d).clone()).collect();
        assert_eq!(names(&docs), vec!["Bruce", "Clark", "Diana"]);
    }

    fn sorted_names(hits: Vec<Hit>) -> Vec<String> {
        let mut names: Vec<String> = hits
            .iter()
            .filter_map(|(_, d)| d.get("name").and_then(Value::as_str).map(str::to_string))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn inc_touches_only_matches() {
        let mut store = MemoryStore::with_docs(&PEOPLE);
        let query = Query::parse_json(r#"{"age": {"$lt": 40}, "$inc": {"age": 1}}"#).unwrap();
        let updated = run(&mut store, &query, QueryMode::Find);
        assert_eq!(updated.len(), 2);

        let ages: Vec<i64> = store
            .docs
            .values()
            .filter_map(|d| d.get("age").and_then(Value::as_i64))
            .collect();
        let mut ages = ages;
        ages.sort_unstable();
        assert_eq!(ages, vec![29, 36, 58, 5000]);
    }

    #[test]
    fn failing_update_writes_nothing() {
        let mut store = MemoryStore::with_docs(&[r#"{"n": 1}"#, r#"{"n": "x"}"#]);
        let query = Query::parse_json(r#"{"$inc": {"n": 1}}"#).unwrap();
        let mut log = QueryLog::new(false);
        let selection = select(&query, &store, QueryMode::Find, &mut log).unwrap();
        let result = mutate(&query, &mut store, selection, &mut log);
        assert!(matches!(result, Err(CoreError::TypeMismatch { .. })));
        assert!(store.docs.values().any(|d| d.get("n") == Some(&Value::Int(1))));
    }

    #[test]
    fn upsert_inserts_once() {
        let mut store = MemoryStore::with_docs(&PEOPLE);
        let query = Query::parse_json(r#"{"name": "Hal", "$upsert": {"age": 40}}"#).unwrap();
        let docs = run(&mut store, &query, QueryMode::Find);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("age"), Some(&Value::Int(40)));
        assert_eq!(store.docs.len(), 5);

        // Now it matches and behaves as $set.
        let query = Query::parse_json(r#"{"name": "Hal", "$upsert": {"age": 41}}"#).unwrap();
        run(&mut store, &query, QueryMode::Find);
        assert_eq!(store.docs.len(), 5);
    }

    #[test]
    fn upsert_ignores_skipped_matches() {
        let mut store = MemoryStore::with_docs(&[r#"{"name": "Ana"}"#]);
        let query = Query::parse_json(r#"{"name": "Ana", "$upsert": {"age": 1}}"#)
            .unwrap()
            .with_hints(Document::from_json_str(r#"{"$skip": 5}"#).unwrap())
            .unwrap();
        let reported = run(&mut store, &query, QueryMode::Find);
        assert!(reported.is_empty());
        assert_eq!(store.docs.len(), 1);
        let ana = store.docs.values().next().unwrap();
        assert_eq!(ana.get("age"), Some(&Value::Int(1)));
    }

    #[test]
    fn updates_reach_matches_outside_the_window() {
        let mut store = MemoryStore::with_docs(&PEOPLE);
        let query = Query::parse_json(r#"{"$inc": {"age": 1}}"#)
            .unwrap()
            .with_hints(
                Document::from_json_str(r#"{"$orderby": {"age": 1}, "$skip": 1, "$max": 2}"#)
                    .unwrap(),
            )
            .unwrap();
        let reported = run(&mut store, &query, QueryMode::Find);
        assert_eq!(names(&reported), vec!["Clark", "Bruce"]);

        let mut ages: Vec<i64> = store
            .docs
            .values()
            .filter_map(|d| d.get("age").and_then(Value::as_i64))
            .collect();
        ages.sort_unstable();
        assert_eq!(ages, vec![29, 36, 59, 5001]);
    }

    #[test]
    fn dropall_removes_matches() {
        let mut store = MemoryStore::with_docs(&PEOPLE);
        let query = Query::parse_json(r#"{"name": {"$begin": "B"}, "$dropall": true}"#).unwrap();
        let removed = run(&mut store, &query, QueryMode::Find);
        assert_eq!(removed.len(), 2);
        assert_eq!(store.docs.len(), 2);
    }

    #[test]
    fn distinct_values() {
        let store = MemoryStore::with_docs(&[
            r#"{"tags": ["a", "b"]}"#,
            r#"{"tags": "b"}"#,
            r#"{"tags": ["c"]}"#,
            r#"{"other": 1}"#,
        ]);
        let query = Query::parse_json("{}").unwrap();
        let hits = select(&query, &store, QueryMode::Find, &mut QueryLog::default())
            .unwrap()
            .into_window();
        let mut values: Vec<String> = distinct("tags", &hits)
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        values.sort();
        assert_eq!(values, vec!["a", "b", "c"]);
    }
}

//! Model-checking harness.
//!
//! [`ModelHarness`] applies operations both to a real collection and to an
//! in-memory model, then verifies the two agree.

use docudb_codec::ID_FIELD;
use docudb_core::{Collection, CoreResult, Database, Document, ObjectId, Query, Value};
use std::collections::BTreeMap;

/// A collection paired with the documents it is expected to hold.
pub struct ModelHarness {
    /// The database instance.
    pub db: Database,
    /// The collection under test.
    pub collection: Collection,
    model: BTreeMap<ObjectId, Document>,
}

impl ModelHarness {
    /// Creates a harness over a fresh in-memory collection named `name`.
    pub fn new(name: &str) -> Self {
        let db = Database::open_in_memory().expect("Failed to open database");
        let collection = db.create_collection(name, None).expect("Failed to create collection");
        Self {
            db,
            collection,
            model: BTreeMap::new(),
        }
    }

    /// Inserts a document and records it in the model.
    pub fn insert(&mut self, doc: Document) -> ObjectId {
        let oid = self.collection.insert(doc.clone()).expect("Failed to insert");
        let mut expected = doc;
        expected.set_id(oid);
        self.model.insert(oid, expected);
        oid
    }

    /// Removes a document from both sides.
    pub fn remove(&mut self, oid: &ObjectId) {
        self.collection.remove(oid).expect("Failed to remove");
        self.model.remove(oid);
    }

    /// Runs an update-bearing query, applying `expected` to every model
    /// document for which `selected` holds. Returns the engine's count.
    pub fn update<S, E>(&mut self, query: &Query, selected: S, expected: E) -> CoreResult<u64>
    where
        S: Fn(&Document) -> bool,
        E: Fn(&mut Document),
    {
        let count = self.collection.update(query)?;
        for doc in self.model.values_mut().filter(|d| selected(d)) {
            expected(doc);
        }
        Ok(count)
    }

    /// Ids the model expects a query to return.
    pub fn expected_ids<F>(&self, predicate: F) -> Vec<ObjectId>
    where
        F: Fn(&Document) -> bool,
    {
        self.model
            .iter()
            .filter(|(_, d)| predicate(d))
            .map(|(oid, _)| *oid)
            .collect()
    }

    /// Ids a query actually returns, sorted.
    pub fn actual_ids(&self, query: &Query) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self
            .collection
            .find(query)
            .expect("Query failed")
            .documents
            .iter()
            .filter_map(|d| d.get(ID_FIELD).and_then(Value::as_object_id))
            .collect();
        ids.sort();
        ids
    }

    /// Asserts the collection holds exactly the model's documents.
    pub fn verify_all(&self) {
        assert_eq!(
            self.collection.count().expect("Failed to count"),
            self.model.len() as u64,
            "document count mismatch"
        );
        for (oid, expected) in &self.model {
            let actual = self.collection.fetch(oid).expect("Failed to fetch");
            assert_eq!(actual.as_ref(), Some(expected), "document mismatch for {oid}");
        }
    }

    /// Number of documents in the model.
    pub fn tracked_count(&self) -> usize {
        self.model.len()
    }
}

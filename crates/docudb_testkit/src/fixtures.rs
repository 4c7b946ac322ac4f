//! Test fixtures and database helpers.

use docudb_core::{Collection, Database, Document};
use std::path::Path;
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::open_in_memory().expect("Failed to open in-memory database"),
            temp_dir: None,
        }
    }

    /// Creates a new database in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(temp_dir.path()).expect("Failed to open file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Closes and reopens a file-based database in place.
    pub fn reopen(self) -> Self {
        let Self { db, temp_dir } = self;
        drop(db);
        let temp_dir = temp_dir.expect("Only file databases can be reopened");
        let db = Database::open(temp_dir.path()).expect("Failed to reopen database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a database in a temporary directory.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, path)
}

/// Parses a JSON literal into a document.
pub fn doc(json: &str) -> Document {
    Document::from_json_str(json).expect("Invalid document JSON")
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Contacts used across query tests.
    pub const CONTACTS: [&str; 4] = [
        r#"{"name": "Bruce", "phone": "333-222-333", "age": 58, "tags": ["admin", "ops"]}"#,
        r#"{"name": "Brian", "phone": "444-123-333", "age": 31, "tags": ["ops"]}"#,
        r#"{"name": "Alice", "phone": "555-000-111", "age": 44, "address": {"city": "Oslo"}}"#,
        r#"{"name": "andrea", "age": 23, "tags": "dev qa"}"#,
    ];

    /// Creates a `contacts` collection holding [`CONTACTS`].
    pub fn contacts(db: &Database) -> Collection {
        let collection = db
            .collection_or_create("contacts")
            .expect("Failed to create contacts");
        for json in CONTACTS {
            collection.insert(doc(json)).expect("Failed to insert contact");
        }
        collection
    }

    /// Creates a collection named `name` with `count` documents `{"i": n}`
    /// for `n` in `0..count`.
    pub fn numbered(db: &Database, name: &str, count: i64) -> Collection {
        let collection = db.collection_or_create(name).expect("Failed to create collection");
        for i in 0..count {
            collection
                .insert(Document::new().with("i", i))
                .expect("Failed to insert document");
        }
        collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_database() {
        let test_db = TestDatabase::memory();
        assert!(test_db.path().is_none());
        assert!(test_db.collections().unwrap().is_empty());
    }

    #[test]
    fn file_database_reopens() {
        let test_db = TestDatabase::file();
        scenarios::numbered(&test_db, "n", 3);
        let test_db = test_db.reopen();
        assert_eq!(test_db.get_collection("n").unwrap().count().unwrap(), 3);
    }

    #[test]
    fn contacts_scenario() {
        with_temp_db(|db| {
            let contacts = scenarios::contacts(db);
            assert_eq!(contacts.count().unwrap(), 4);
        });
    }
}

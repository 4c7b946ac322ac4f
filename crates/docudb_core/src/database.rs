//! Database facade and collection catalog.

use crate::collection::{Collection, CollectionShared};
use crate::config::{CollectionOptions, Config};
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexKind;
use crate::manifest::{CollectionEntry, Manifest};
use docudb_codec::{Document, ObjectId};
use docudb_storage::{BackendOptions, FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Collection names must be strictly shorter than this many bytes.
pub const MAX_COLLECTION_NAME_LEN: usize = 128;

/// State shared between a [`Database`] and the collection handles it hands
/// out. Handles keep only a weak reference, so dropping the database
/// invalidates them.
pub(crate) struct Catalog {
    config: Config,
    dir: Option<DatabaseDir>,
    collections: RwLock<BTreeMap<String, Arc<CollectionShared>>>,
    open: AtomicBool,
}

impl Catalog {
    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn dir(&self) -> Option<&DatabaseDir> {
        self.dir.as_ref()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn writable(&self) -> CoreResult<()> {
        if !self.is_open() {
            return Err(CoreError::DatabaseClosed);
        }
        if self.config.open_mode.is_read_only() {
            return Err(CoreError::ReadOnly);
        }
        Ok(())
    }

    /// Resolves a document in another collection, for `$do` joins.
    pub(crate) fn lookup(&self, collection: &str, oid: &ObjectId) -> Option<Document> {
        let shared = self.collections.read().get(collection).cloned()?;
        shared.lookup(oid)
    }

    pub(crate) fn shared(&self) -> Vec<Arc<CollectionShared>> {
        self.collections.read().values().cloned().collect()
    }

    /// Writes the manifest describing every collection. No-op for in-memory
    /// and read-only databases.
    pub(crate) fn save_manifest(&self) -> CoreResult<()> {
        let Some(dir) = self.dir.as_ref() else {
            return Ok(());
        };
        if self.config.open_mode.is_read_only() {
            return Ok(());
        }
        let mut manifest = Manifest::new();
        for (name, shared) in self.collections.read().iter() {
            manifest.collections.insert(
                name.clone(),
                CollectionEntry {
                    options: shared.options(),
                    indexes: shared.index_defs(),
                },
            );
        }
        dir.save_manifest(&manifest)
    }

    fn open_collection(
        &self,
        name: &str,
        options: CollectionOptions,
        indexes: &[(String, IndexKind)],
    ) -> CoreResult<CollectionShared> {
        let backend_options = BackendOptions::new()
            .large(options.large)
            .read_only(self.config.open_mode.is_read_only());
        let backend: Box<dyn StorageBackend> = match &self.dir {
            Some(dir) => Box::new(FileBackend::open(&dir.data_path(name), backend_options)?),
            None => Box::new(InMemoryBackend::with_options(backend_options)),
        };
        CollectionShared::open(name, options, backend, indexes, self.dir.as_ref())
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("path", &self.dir.as_ref().map(DatabaseDir::path))
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Checks a collection name: non-empty, shorter than
/// [`MAX_COLLECTION_NAME_LEN`] bytes, and free of `.`, `$`, path separators
/// and NUL.
pub fn validate_collection_name(name: &str) -> CoreResult<()> {
    let valid = !name.is_empty()
        && name.len() < MAX_COLLECTION_NAME_LEN
        && !name
            .chars()
            .any(|c| matches!(c, '.' | '$' | '/' | '\\' | '\0'));
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// The main database handle.
///
/// A database is a directory holding one data log per collection, one file
/// per index and a `MANIFEST` listing collections with their options and
/// index definitions.
///
/// # Opening a Database
///
/// ```rust,no_run
/// use docudb_core::{Database, Document, Query};
/// use std::path::Path;
///
/// # fn main() -> docudb_core::CoreResult<()> {
/// let db = Database::open(Path::new("my_database"))?;
/// let contacts = db.collection_or_create("contacts")?;
/// contacts.insert(Document::new().with("name", "Bruce").with("age", 58))?;
///
/// let query = Query::parse_json(r#"{"name": {"$begin": "Bru"}}"#)?;
/// assert_eq!(contacts.find(&query)?.documents.len(), 1);
/// db.close()?;
/// # Ok(())
/// # }
/// ```
///
/// # In-Memory Databases
///
/// For testing, use [`Database::open_in_memory`]. Nothing is written to disk.
pub struct Database {
    catalog: Arc<Catalog>,
}

impl Database {
    /// Opens or creates a database in `path` with the default configuration.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database from a directory path with custom configuration.
    ///
    /// Collections listed in the manifest are opened and their data logs
    /// scanned. Index files that are missing, corrupt or out of date are
    /// discarded and the index rebuilt from the documents.
    ///
    /// # Errors
    ///
    /// - `InvalidFormat` if the directory is missing without `CREATE`, or
    ///   the manifest is unreadable
    /// - `DatabaseLocked` if `LOCK_NB` is set and another process holds the
    ///   lock
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.open_mode)?;
        let manifest = dir.load_manifest()?;
        let fresh = manifest.is_none();
        let manifest = manifest.unwrap_or_default();

        let catalog = Catalog {
            config,
            dir: Some(dir),
            collections: RwLock::new(BTreeMap::new()),
            open: AtomicBool::new(true),
        };
        {
            let mut collections = catalog.collections.write();
            for (name, entry) in &manifest.collections {
                let shared = catalog.open_collection(name, entry.options, &entry.indexes)?;
                collections.insert(name.clone(), Arc::new(shared));
            }
        }
        if fresh {
            catalog.save_manifest()?;
        }

        info!(
            path = %path.display(),
            collections = manifest.collections.len(),
            read_only = catalog.config.open_mode.is_read_only(),
            "database opened"
        );
        Ok(Self {
            catalog: Arc::new(catalog),
        })
    }

    /// Opens a fresh in-memory database.
    ///
    /// Data is lost when the database is closed.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_in_memory_with_config(Config::default())
    }

    /// Opens a fresh in-memory database with custom configuration. Only the
    /// transaction and collection settings of `config` apply.
    pub fn open_in_memory_with_config(config: Config) -> CoreResult<Self> {
        Ok(Self {
            catalog: Arc::new(Catalog {
                config,
                dir: None,
                collections: RwLock::new(BTreeMap::new()),
                open: AtomicBool::new(true),
            }),
        })
    }

    /// Database directory, or `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.catalog.dir.as_ref().map(DatabaseDir::path)
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.catalog.config
    }

    pub(crate) fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.catalog.is_open() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }

    fn handle(&self, shared: Arc<CollectionShared>) -> Collection {
        Collection::new(shared, Arc::downgrade(&self.catalog))
    }

    /// Creates a collection, or returns the existing one.
    ///
    /// `options` apply only when the collection is new.
    ///
    /// # Errors
    ///
    /// - `InvalidName` if `name` breaks the naming rule
    /// - `TooManyCollections` if the configured limit is reached
    /// - `ReadOnly` if the collection is new and the database read-only
    pub fn create_collection(
        &self,
        name: &str,
        options: Option<CollectionOptions>,
    ) -> CoreResult<Collection> {
        self.ensure_open()?;
        validate_collection_name(name)?;
        if let Some(shared) = self.catalog.collections.read().get(name) {
            return Ok(self.handle(Arc::clone(shared)));
        }
        self.catalog.writable()?;

        let shared = {
            let mut collections = self.catalog.collections.write();
            if let Some(shared) = collections.get(name) {
                return Ok(self.handle(Arc::clone(shared)));
            }
            let limit = self.catalog.config.max_collections;
            if collections.len() >= limit {
                return Err(CoreError::TooManyCollections { limit });
            }
            let options = options.unwrap_or_default();
            let shared = Arc::new(self.catalog.open_collection(name, options, &[])?);
            collections.insert(name.to_string(), Arc::clone(&shared));
            shared
        };
        self.catalog.save_manifest()?;
        info!(collection = name, "collection created");
        Ok(self.handle(shared))
    }

    /// Returns an existing collection.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if it does not exist.
    pub fn get_collection(&self, name: &str) -> CoreResult<Collection> {
        self.ensure_open()?;
        let shared = self
            .catalog
            .collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::collection_not_found(name))?;
        Ok(self.handle(shared))
    }

    /// Returns a collection, creating it with default options if absent and
    /// `auto_create_collections` is enabled.
    pub fn collection_or_create(&self, name: &str) -> CoreResult<Collection> {
        match self.get_collection(name) {
            Err(CoreError::CollectionNotFound { .. }) if self.config().auto_create_collections => {
                self.create_collection(name, None)
            }
            other => other,
        }
    }

    /// Every collection, sorted by name.
    pub fn collections(&self) -> CoreResult<Vec<Collection>> {
        self.ensure_open()?;
        Ok(self
            .catalog
            .shared()
            .into_iter()
            .map(|shared| self.handle(shared))
            .collect())
    }

    /// Removes a collection. Outstanding handles become invalid. With
    /// `purge`, the data file and every index file are deleted.
    ///
    /// Returns whether the collection existed.
    pub fn drop_collection(&self, name: &str, purge: bool) -> CoreResult<bool> {
        self.ensure_open()?;
        self.catalog.writable()?;
        let Some(shared) = self.catalog.collections.write().remove(name) else {
            return Ok(false);
        };
        shared.invalidate();
        if purge {
            if let Some(dir) = self.catalog.dir() {
                let removed = dir.remove_collection_files(name)?;
                info!(collection = name, files = removed, "collection files purged");
            }
        }
        self.catalog.save_manifest()?;
        info!(collection = name, purge, "collection dropped");
        Ok(true)
    }

    /// Flushes every collection and saves indexes.
    pub fn sync(&self) -> CoreResult<()> {
        self.ensure_open()?;
        if self.config().open_mode.is_read_only() {
            return Ok(());
        }
        for shared in self.catalog.shared() {
            shared.sync(self.catalog.dir())?;
        }
        Ok(())
    }

    /// Closes the database.
    ///
    /// Unfinished transactions are aborted, data logs synced and indexes
    /// saved. Later calls on this database or its collection handles fail
    /// with `DatabaseClosed`. Closing twice is a no-op.
    pub fn close(&self) -> CoreResult<()> {
        if !self.catalog.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let writable = !self.config().open_mode.is_read_only();
        let mut first_error = None;
        for shared in self.catalog.shared() {
            shared.abort_unfinished();
            if writable {
                if let Err(err) = shared.sync(self.catalog.dir()) {
                    warn!(collection = shared.name(), error = %err, "failed to sync on close");
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Err(err) = self.catalog.save_manifest() {
            first_error.get_or_insert(err);
        }
        info!(path = ?self.path(), "database closed");
        first_error.map_or(Ok(()), Err)
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.catalog.is_open()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path())
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "error closing database");
        }
    }
}

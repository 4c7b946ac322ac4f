//! Database directory management.
//!
//! ```text
//! <db_path>/
//! ├─ MANIFEST                       # collection catalog
//! ├─ LOCK                           # advisory lock
//! ├─ <collection>.data              # data log
//! ├─ <collection>.data.swap         # compaction output, before the rename
//! └─ <collection>.idx.<kind>.<path> # one file per index
//! ```

use crate::config::OpenMode;
use crate::error::{CoreError, CoreResult};
use crate::index::persistence::index_file_name;
use crate::index::IndexKind;
use crate::manifest::Manifest;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MANIFEST_FILE: &str = "MANIFEST";
const MANIFEST_TEMP: &str = "MANIFEST.tmp";
const LOCK_FILE: &str = "LOCK";
const DATA_SUFFIX: &str = ".data";
const SWAP_SUFFIX: &str = ".data.swap";

/// An open database directory, holding its advisory lock for its lifetime.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    _lock_file: Option<File>,
}

impl DatabaseDir {
    /// Opens a database directory according to `mode`.
    ///
    /// Writers take an exclusive lock, readers a shared one, and `NO_LOCK`
    /// skips locking. With `LOCK_NB` a held lock fails immediately instead
    /// of blocking.
    ///
    /// # Errors
    ///
    /// - `InvalidFormat` if the directory is missing and `CREATE` is not set,
    ///   or the path is not a directory
    /// - `DatabaseLocked` if `LOCK_NB` is set and the lock is held elsewhere
    pub fn open(path: &Path, mode: OpenMode) -> CoreResult<Self> {
        if !path.exists() {
            if mode.contains(OpenMode::CREATE) && !mode.is_read_only() {
                fs::create_dir_all(path)?;
                info!(path = %path.display(), "created database directory");
            } else {
                return Err(CoreError::invalid_format(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = if mode.contains(OpenMode::NO_LOCK) {
            None
        } else {
            Some(acquire_lock(&path.join(LOCK_FILE), mode)?)
        };

        let dir = Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        };
        if mode.contains(OpenMode::TRUNCATE) && !mode.is_read_only() {
            dir.truncate_all()?;
        }
        Ok(dir)
    }

    /// The database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the manifest file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    /// Path of a collection's data log.
    #[must_use]
    pub fn data_path(&self, collection: &str) -> PathBuf {
        self.path.join(format!("{collection}{DATA_SUFFIX}"))
    }

    /// Path of one index file.
    #[must_use]
    pub fn index_path(&self, collection: &str, field: &str, kind: IndexKind) -> PathBuf {
        self.path.join(index_file_name(collection, field, kind))
    }

    /// Loads the manifest, or `None` for a new database.
    pub fn load_manifest(&self) -> CoreResult<Option<Manifest>> {
        let data = match fs::read(self.manifest_path()) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if data.is_empty() {
            return Ok(None);
        }
        Manifest::decode(&data).map(Some)
    }

    /// Saves the manifest atomically: temp file, fsync, rename, directory
    /// fsync.
    pub fn save_manifest(&self, manifest: &Manifest) -> CoreResult<()> {
        self.write_atomic(&self.path.join(MANIFEST_TEMP), &self.manifest_path(), &manifest.encode()?)
    }

    /// Writes `data` to `target` through a temporary sibling file.
    pub(crate) fn write_atomic(&self, temp: &Path, target: &Path, data: &[u8]) -> CoreResult<()> {
        let mut file = File::create(temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(temp, target)?;
        self.sync_directory()
    }

    /// Writes an index file atomically.
    pub(crate) fn save_index(
        &self,
        collection: &str,
        field: &str,
        kind: IndexKind,
        data: &[u8],
    ) -> CoreResult<()> {
        let target = self.index_path(collection, field, kind);
        let mut temp = target.clone().into_os_string();
        temp.push(".tmp");
        self.write_atomic(Path::new(&temp), &target, data)
    }

    /// Removes one index file, if present.
    pub(crate) fn remove_index(&self, collection: &str, field: &str, kind: IndexKind) -> CoreResult<()> {
        remove_if_exists(&self.index_path(collection, field, kind))
    }

    /// Removes the data log and every index file of a collection.
    ///
    /// Returns the number of files deleted.
    pub fn remove_collection_files(&self, collection: &str) -> CoreResult<usize> {
        let index_prefix = format!("{collection}.idx.");
        let data_name = format!("{collection}{DATA_SUFFIX}");
        let swap_name = format!("{collection}{SWAP_SUFFIX}");
        let mut deleted = 0;
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name == data_name || name == swap_name || name.starts_with(&index_prefix) {
                fs::remove_file(entry.path())?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            self.sync_directory()?;
        }
        debug!(collection, deleted, "removed collection files");
        Ok(deleted)
    }

    /// Discards every collection file and the manifest.
    fn truncate_all(&self) -> CoreResult<()> {
        let mut deleted = 0usize;
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(DATA_SUFFIX)
                || name.ends_with(SWAP_SUFFIX)
                || name.contains(".idx.")
                || name == MANIFEST_FILE
            {
                fs::remove_file(entry.path())?;
                deleted += 1;
            }
        }
        info!(path = %self.path.display(), deleted, "truncated database");
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        Ok(())
    }
}

fn acquire_lock(path: &Path, mode: OpenMode) -> CoreResult<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    let exclusive = !mode.is_read_only();
    if mode.contains(OpenMode::LOCK_NB) {
        let locked = if exclusive {
            FileExt::try_lock_exclusive(&file)
        } else {
            FileExt::try_lock_shared(&file)
        };
        if locked.is_err() {
            return Err(CoreError::DatabaseLocked);
        }
    } else if exclusive {
        FileExt::lock_exclusive(&file)?;
    } else {
        FileExt::lock_shared(&file)?;
    }
    Ok(file)
}

fn remove_if_exists(path: &Path) -> CoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::CollectionEntry;
    use tempfile::tempdir;

    fn writer() -> OpenMode {
        OpenMode::WRITER | OpenMode::CREATE | OpenMode::LOCK_NB
    }

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("new_db");
        let dir = DatabaseDir::open(&db_path, writer()).unwrap();
        assert!(db_path.is_dir());
        assert_eq!(dir.data_path("users"), db_path.join("users.data"));
        assert_eq!(
            dir.index_path("users", "name", IndexKind::IString),
            db_path.join("users.idx.istring.name")
        );
    }

    #[test]
    fn missing_directory_without_create_fails() {
        let temp = tempdir().unwrap();
        let result = DatabaseDir::open(&temp.path().join("none"), OpenMode::WRITER);
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn writer_lock_is_exclusive() {
        let temp = tempdir().unwrap();
        let _first = DatabaseDir::open(temp.path(), writer()).unwrap();
        let second = DatabaseDir::open(temp.path(), writer());
        assert!(matches!(second, Err(CoreError::DatabaseLocked)));
        let reader = DatabaseDir::open(temp.path(), OpenMode::READER | OpenMode::LOCK_NB);
        assert!(matches!(reader, Err(CoreError::DatabaseLocked)));
    }

    #[test]
    fn readers_share_the_lock() {
        let temp = tempdir().unwrap();
        drop(DatabaseDir::open(temp.path(), writer()).unwrap());
        let reader = OpenMode::READER | OpenMode::LOCK_NB;
        let _first = DatabaseDir::open(temp.path(), reader).unwrap();
        assert!(DatabaseDir::open(temp.path(), reader).is_ok());
        assert!(matches!(
            DatabaseDir::open(temp.path(), writer()),
            Err(CoreError::DatabaseLocked)
        ));
    }

    #[test]
    fn no_lock_skips_locking() {
        let temp = tempdir().unwrap();
        let _first = DatabaseDir::open(temp.path(), writer()).unwrap();
        let unlocked = DatabaseDir::open(temp.path(), writer() | OpenMode::NO_LOCK);
        assert!(unlocked.is_ok());
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        drop(DatabaseDir::open(temp.path(), writer()).unwrap());
        assert!(DatabaseDir::open(temp.path(), writer()).is_ok());
    }

    #[test]
    fn manifest_round_trip() {
        let temp = tempdir().unwrap();
        let dir = DatabaseDir::open(temp.path(), writer()).unwrap();
        assert!(dir.load_manifest().unwrap().is_none());

        let mut manifest = Manifest::new();
        manifest
            .collections
            .insert("users".into(), CollectionEntry::default());
        dir.save_manifest(&manifest).unwrap();
        assert_eq!(dir.load_manifest().unwrap(), Some(manifest));
        assert!(!temp.path().join(MANIFEST_TEMP).exists());
    }

    #[test]
    fn collection_files_are_removed_together() {
        let temp = tempdir().unwrap();
        let dir = DatabaseDir::open(temp.path(), writer()).unwrap();
        fs::write(dir.data_path("a"), b"x").unwrap();
        dir.save_index("a", "f", IndexKind::Number, b"y").unwrap();
        fs::write(dir.data_path("ab"), b"z").unwrap();
        fs::write(temp.path().join("a.data.swap"), b"w").unwrap();

        assert_eq!(dir.remove_collection_files("a").unwrap(), 3);
        assert!(dir.data_path("ab").exists());
        dir.remove_index("a", "f", IndexKind::Number).unwrap();
    }

    #[test]
    fn truncate_discards_everything() {
        let temp = tempdir().unwrap();
        {
            let dir = DatabaseDir::open(temp.path(), writer()).unwrap();
            fs::write(dir.data_path("a"), b"x").unwrap();
            dir.save_manifest(&Manifest::new()).unwrap();
        }
        let dir = DatabaseDir::open(temp.path(), writer() | OpenMode::TRUNCATE).unwrap();
        assert!(!dir.data_path("a").exists());
        assert!(dir.load_manifest().unwrap().is_none());
    }
}

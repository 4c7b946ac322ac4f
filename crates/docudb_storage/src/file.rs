//! File-based storage backend.

use crate::backend::{BackendOptions, StorageBackend};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A backend stored in a single OS file.
///
/// `flush()` pushes data to the OS, `sync()` calls `File::sync_all()`.
/// Reads and appends are serialized by an internal lock so the backend can
/// be shared behind an `Arc`.
///
/// # Example
///
/// ```no_run
/// use docudb_storage::{BackendOptions, FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("people.data"), BackendOptions::new()).unwrap();
/// backend.append(b"record").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
    size: RwLock<u64>,
    options: BackendOptions,
}

impl FileBackend {
    /// Opens or creates the file at `path`.
    ///
    /// A read-only backend never creates the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, created or truncated.
    pub fn open(path: &Path, options: BackendOptions) -> StorageResult<Self> {
        let file = if options.read_only {
            OpenOptions::new().read(true).open(path)?
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(options.truncate)
                .open(path)?
        };

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size: RwLock::new(size),
            options,
        })
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file a replacement is staged in before the rename.
    fn staging_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".swap");
        PathBuf::from(name)
    }

    fn write_staged(staging: &Path, data: &[u8]) -> StorageResult<File> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(staging)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(file)
    }
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> StorageResult<()> {
    Ok(())
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut size = self.size.write();
        if data.is_empty() {
            return Ok(*size);
        }
        self.options.check_append(*size, data.len())?;

        let mut file = self.file.write();
        let offset = *size;
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        *size += data.len() as u64;

        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.options.read_only {
            return Ok(());
        }
        self.file.write().flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.options.read_only {
            return Ok(());
        }
        let mut file = self.file.write();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.options.read_only {
            return Err(StorageError::ReadOnly);
        }
        let file = self.file.write();
        let mut size = self.size.write();

        if new_size > *size {
            return Err(StorageError::InvalidTruncate {
                requested: new_size,
                size: *size,
            });
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;

        Ok(())
    }

    fn replace_contents(&mut self, data: &[u8]) -> StorageResult<()> {
        self.options.check_append(0, data.len())?;
        let staging = self.staging_path();
        let staged = match Self::write_staged(&staging, data) {
            Ok(file) => file,
            Err(err) => {
                fs::remove_file(&staging).ok();
                return Err(err);
            }
        };
        if let Err(err) = fs::rename(&staging, &self.path) {
            fs::remove_file(&staging).ok();
            return Err(err.into());
        }

        // The staged handle now refers to the file at `path`.
        let mut size = self.size.write();
        *self.file.write() = staged;
        *size = data.len() as u64;
        drop(size);
        sync_parent(&self.path)
    }

    fn is_read_only(&self) -> bool {
        self.options.read_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.data");

        let backend = FileBackend::open(&path, BackendOptions::new()).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn append_then_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.data");
        let mut backend = FileBackend::open(&path, BackendOptions::new()).unwrap();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello world");
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
        assert_eq!(backend.read_all().unwrap(), b"hello world");
    }

    #[test]
    fn read_past_end_fails() {
        let dir = tempdir().unwrap();
        let mut backend =
            FileBackend::open(&dir.path().join("c.data"), BackendOptions::new()).unwrap();
        backend.append(b"hello").unwrap();

        assert!(matches!(
            backend.read_at(3, 5),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn content_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.data");

        {
            let mut backend = FileBackend::open(&path, BackendOptions::new()).unwrap();
            backend.append(b"persistent").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path, BackendOptions::new()).unwrap();
        assert_eq!(backend.read_at(0, 10).unwrap(), b"persistent");
    }

    #[test]
    fn truncate_on_open_discards_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.data");
        {
            let mut backend = FileBackend::open(&path, BackendOptions::new()).unwrap();
            backend.append(b"old").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path, BackendOptions::new().truncate(true)).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
    }

    #[test]
    fn read_only_rejects_writes_and_missing_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.data");

        let options = BackendOptions::new().read_only(true);
        assert!(FileBackend::open(&path, options).is_err());

        {
            let mut backend = FileBackend::open(&path, BackendOptions::new()).unwrap();
            backend.append(b"data").unwrap();
        }

        let mut backend = FileBackend::open(&path, options).unwrap();
        assert!(backend.is_read_only());
        assert_eq!(backend.read_at(0, 4).unwrap(), b"data");
        assert!(matches!(backend.append(b"x"), Err(StorageError::ReadOnly)));
        assert!(matches!(backend.truncate(0), Err(StorageError::ReadOnly)));
    }

    #[test]
    fn size_limit_enforced() {
        let dir = tempdir().unwrap();
        let options = BackendOptions::new().size_limit(Some(6));
        let mut backend = FileBackend::open(&dir.path().join("c.data"), options).unwrap();

        backend.append(b"abcd").unwrap();
        assert!(matches!(
            backend.append(b"efg"),
            Err(StorageError::CapacityExceeded { .. })
        ));
        assert_eq!(backend.size().unwrap(), 4);
    }

    #[test]
    fn replace_contents_renames_a_staged_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.data");
        let mut backend = FileBackend::open(&path, BackendOptions::new()).unwrap();
        backend.append(b"a long original log").unwrap();

        backend.replace_contents(b"short").unwrap();
        assert_eq!(backend.size().unwrap(), 5);
        assert_eq!(backend.read_all().unwrap(), b"short");
        assert!(!dir.path().join("c.data.swap").exists());

        assert_eq!(backend.append(b"+tail").unwrap(), 5);
        backend.sync().unwrap();
        drop(backend);

        let reopened = FileBackend::open(&path, BackendOptions::new()).unwrap();
        assert_eq!(reopened.read_all().unwrap(), b"short+tail");
    }

    #[test]
    fn failed_replace_keeps_old_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.data");
        let options = BackendOptions::new().size_limit(Some(8));
        let mut backend = FileBackend::open(&path, options).unwrap();
        backend.append(b"keep").unwrap();

        assert!(matches!(
            backend.replace_contents(b"far too long"),
            Err(StorageError::CapacityExceeded { .. })
        ));
        assert_eq!(backend.read_all().unwrap(), b"keep");
        assert!(!dir.path().join("c.data.swap").exists());
    }

    #[test]
    fn truncate_drops_tail() {
        let dir = tempdir().unwrap();
        let mut backend =
            FileBackend::open(&dir.path().join("c.data"), BackendOptions::new()).unwrap();
        backend.append(b"hello world").unwrap();

        backend.truncate(5).unwrap();
        assert_eq!(backend.size().unwrap(), 5);
        assert!(matches!(
            backend.truncate(50),
            Err(StorageError::InvalidTruncate { .. })
        ));
    }
}

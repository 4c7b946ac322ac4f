//! In-memory storage backend.

use crate::backend::{BackendOptions, StorageBackend};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// A backend that keeps its bytes in a `Vec<u8>`.
///
/// Used by `:memory:` databases and throughout the test suites.
///
/// # Example
///
/// ```rust
/// use docudb_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// assert_eq!(backend.append(b"test data").unwrap(), 0);
/// assert_eq!(backend.size().unwrap(), 9);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
    options: BackendOptions,
}

impl InMemoryBackend {
    /// Creates an empty backend with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend with the given options.
    #[must_use]
    pub fn with_options(options: BackendOptions) -> Self {
        Self {
            data: RwLock::new(Vec::new()),
            options,
        }
    }

    /// Creates a backend holding pre-existing bytes.
    ///
    /// Useful for replaying torn or corrupted logs in tests.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
            options: BackendOptions::default(),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = usize::try_from(offset).map_err(|_| StorageError::ReadPastEnd {
            offset,
            len,
            size,
        })?;
        let end = start.saturating_add(len);

        if start > data.len() || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        if new_data.is_empty() {
            return Ok(offset);
        }
        self.options.check_append(offset, new_data.len())?;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.options.read_only {
            return Err(StorageError::ReadOnly);
        }
        let mut data = self.data.write();
        let size = data.len() as u64;

        if new_size > size {
            return Err(StorageError::InvalidTruncate {
                requested: new_size,
                size,
            });
        }

        // new_size <= data.len(), so it fits in usize
        data.truncate(new_size as usize);
        Ok(())
    }

    fn replace_contents(&mut self, new_data: &[u8]) -> StorageResult<()> {
        self.options.check_append(0, new_data.len())?;
        *self.data.write() = new_data.to_vec();
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    fn read_all(&self) -> StorageResult<Vec<u8>> {
        Ok(self.data.read().clone())
    }
}

//! Storage backend trait definition.

use crate::error::{StorageError, StorageResult};

/// Size ceiling applied to backends that are not opened in large mode (2 GiB).
pub const DEFAULT_SIZE_LIMIT: u64 = 2 * 1024 * 1024 * 1024;

/// Options applied when a backend is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendOptions {
    /// Reject every mutation with [`StorageError::ReadOnly`].
    pub read_only: bool,
    /// Discard existing content at open.
    pub truncate: bool,
    /// Maximum size in bytes, `None` for unbounded.
    pub size_limit: Option<u64>,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            truncate: false,
            size_limit: Some(DEFAULT_SIZE_LIMIT),
        }
    }
}

impl BackendOptions {
    /// Creates default options (writable, 2 GiB ceiling).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets read-only mode.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets truncate-on-open.
    #[must_use]
    pub const fn truncate(mut self, value: bool) -> Self {
        self.truncate = value;
        self
    }

    /// Lifts the size ceiling when `large` is set.
    #[must_use]
    pub const fn large(mut self, large: bool) -> Self {
        self.size_limit = if large { None } else { Some(DEFAULT_SIZE_LIMIT) };
        self
    }

    /// Sets an explicit ceiling.
    #[must_use]
    pub const fn size_limit(mut self, limit: Option<u64>) -> Self {
        self.size_limit = limit;
        self
    }

    /// Checks that `len` more bytes may be appended to a backend of `size` bytes.
    pub(crate) fn check_append(&self, size: u64, len: usize) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let requested = size.saturating_add(len as u64);
        match self.size_limit {
            Some(limit) if requested > limit => {
                Err(StorageError::CapacityExceeded { requested, limit })
            }
            _ => Ok(()),
        }
    }
}

/// An append-oriented byte store.
///
/// DocuDB keeps one backend per collection data log and one per persisted
/// index. The engine owns every byte layout; a backend only guarantees:
///
/// - `append` returns the offset the data was written at
/// - `read_at` returns exactly the bytes written at that offset
/// - `sync` makes everything appended so far durable
///
/// Implementations must be `Send + Sync`; collections are shared across
/// threads behind their own locks.
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`] if the range is not fully
    /// inside the backend, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`], [`StorageError::CapacityExceeded`]
    /// or an I/O error.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes (the offset of the next append).
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Flushes and forces data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Cuts the backend down to `new_size` bytes.
    ///
    /// Used to drop a torn trailing record and to reset a log before a
    /// rewrite.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidTruncate`] if `new_size` is larger than
    /// the current size, [`StorageError::ReadOnly`], or an I/O error.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Replaces the whole content with `data` in one step.
    ///
    /// Either the old or the new content survives a crash; never a mix of
    /// the two or an empty backend. Used to rewrite a log during
    /// compaction. On error the old content is left in place.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`], [`StorageError::CapacityExceeded`]
    /// or an I/O error.
    fn replace_contents(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Whether mutations are rejected.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Reads the whole content.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| StorageError::ReadPastEnd {
            offset: 0,
            len: usize::MAX,
            size,
        })?;
        self.read_at(0, len)
    }
}

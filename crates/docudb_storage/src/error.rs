//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// A write was attempted on a backend opened read-only.
    #[error("storage is read-only")]
    ReadOnly,

    /// An append would grow the backend past its size ceiling.
    #[error("storage capacity exceeded: {requested} bytes requested, limit is {limit}")]
    CapacityExceeded {
        /// Size the backend would have after the append.
        requested: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// Truncation target lies beyond the current end.
    #[error("cannot truncate to {requested} bytes, current size is {size}")]
    InvalidTruncate {
        /// Requested size.
        requested: u64,
        /// Current size.
        size: u64,
    },
}

//! # DocuDB Storage
//!
//! Byte-store collaborators used by the DocuDB document engine.
//!
//! Every collection data log and every persisted index lives in a
//! [`StorageBackend`]. Backends are **opaque**: they append and read bytes
//! and know nothing about documents, records or indexes.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - for tests and `:memory:` databases
//! - [`FileBackend`] - one OS file per backend
//!
//! Both honour [`BackendOptions`]: a read-only switch and an optional
//! size ceiling (the 2 GiB default for collections that are not opened in
//! large mode).
//!
//! ## Example
//!
//! ```rust
//! use docudb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"record").unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{BackendOptions, StorageBackend, DEFAULT_SIZE_LIMIT};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;

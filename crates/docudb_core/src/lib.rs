//! # DocuDB Core
//!
//! Embedded document engine for DocuDB.
//!
//! This crate provides:
//! - Collections of schemaless documents, each stored in an append-only
//!   data log keyed by [`ObjectId`]
//! - Secondary indexes per (field path, [`IndexKind`]) that the query
//!   planner uses for equality, range, prefix and token lookups
//! - A query language with `$`-operators, OR alternatives, hints
//!   (`$orderby`, `$skip`, `$max`, `$fields`) and in-place update operators
//! - Single-owner transactions per collection with commit and rollback
//! - A metadata document describing the database, and JSON export/import
//!
//! ## Example
//!
//! ```rust
//! use docudb_core::{Database, Document, IndexKind, IndexRequest, Query};
//!
//! # fn main() -> docudb_core::CoreResult<()> {
//! let db = Database::open_in_memory()?;
//! let contacts = db.collection_or_create("contacts")?;
//! contacts.set_index("age", &IndexRequest::create(IndexKind::Number))?;
//! for age in 0..10 {
//!     contacts.insert(Document::new().with("age", age))?;
//! }
//!
//! let query = Query::parse_json(r#"{"age": {"$bt": [3, 6]}}"#)?;
//! assert_eq!(contacts.count_matching(&query)?, 4);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod database;
mod dir;
mod error;
mod fieldpath;
mod index;
mod manifest;
mod meta;
mod query;
mod transaction;
mod transfer;
mod types;

pub use collection::{Collection, CompactionStats};
pub use config::{CollectionOptions, Config, OpenMode};
pub use database::{validate_collection_name, Database, MAX_COLLECTION_NAME_LEN};
pub use dir::DatabaseDir;
pub use error::{CoreError, CoreResult};
pub use index::{IndexAction, IndexInfo, IndexKind, IndexRequest};
pub use manifest::{CollectionEntry, Manifest};
pub use query::{Query, QueryMode, QueryOptions, QueryResult};
pub use transaction::{TransactionGuard, TransactionManager, TransactionState};
pub use transfer::ImportMode;
pub use types::{SequenceNumber, TransactionId};

pub use docudb_codec::{Document, ObjectId, Value};

/// Version of the engine crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

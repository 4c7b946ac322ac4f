//! # DocuDB Testkit
//!
//! Test utilities for DocuDB.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Property-based test generators using proptest
//! - A model-checking harness that mirrors a collection in memory
//! - Concurrency stress helpers
//!
//! Cross-crate integration tests live in `tests/`.
//!
//! ## Usage
//!
//! ```rust
//! use docudb_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     let contacts = db.collection_or_create("contacts").unwrap();
//!     assert_eq!(contacts.count().unwrap(), 0);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;

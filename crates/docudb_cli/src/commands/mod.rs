//! CLI command implementations.

pub mod document;
pub mod index;
pub mod meta;
pub mod transfer;

use docudb_core::{Config, Database, OpenMode};
use std::path::Path;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine failure.
    #[error(transparent)]
    Core(#[from] docudb_core::CoreError),

    /// Malformed JSON argument.
    #[error("invalid JSON argument: {0}")]
    Json(#[from] docudb_codec::CodecError),

    /// Writing output failed.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad command-line value.
    #[error("{0}")]
    Usage(String),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Opens the database at `path`, read-only unless `write` is set.
pub fn open(path: &Path, write: bool) -> CliResult<Database> {
    let mode = if write {
        OpenMode::WRITER | OpenMode::CREATE
    } else {
        OpenMode::READER
    };
    Ok(Database::open_with_config(path, Config::new().open_mode(mode))?)
}

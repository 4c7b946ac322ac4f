//! `export` and `import` commands.

use super::{open, CliResult};
use docudb_core::ImportMode;
use std::io::Write;
use std::path::Path;

/// Exports collections as JSON files into `target`.
pub fn export(path: &Path, target: &Path, names: &[String], out: &mut impl Write) -> CliResult<()> {
    let db = open(path, false)?;
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    for file in db.export(target, &names)? {
        writeln!(out, "{}", file.display())?;
    }
    Ok(())
}

/// Imports collections from JSON files in `source`.
pub fn import(
    path: &Path,
    source: &Path,
    names: &[String],
    replace: bool,
    out: &mut impl Write,
) -> CliResult<()> {
    let mode = if replace {
        ImportMode::Replace
    } else {
        ImportMode::Update
    };
    let db = open(path, true)?;
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let count = db.import(source, &names, mode)?;
    writeln!(out, "imported {count} documents")?;
    Ok(())
}

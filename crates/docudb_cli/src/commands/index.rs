//! `index` command.

use super::{open, CliError, CliResult};
use docudb_core::{IndexAction, IndexKind, IndexRequest};
use std::io::Write;
use std::path::Path;

/// Applies an index action to `field` of `collection` and prints the
/// resulting index list.
pub fn run(
    path: &Path,
    collection: &str,
    field: &str,
    kind: &str,
    action: &str,
    out: &mut impl Write,
) -> CliResult<()> {
    let kind = IndexKind::from_name(kind)
        .ok_or_else(|| CliError::Usage(format!("unknown index kind: {kind}")))?;
    let action = IndexAction::from_name(action)
        .ok_or_else(|| CliError::Usage(format!("unknown index action: {action}")))?;

    let db = open(path, true)?;
    let collection = db.get_collection(collection)?;
    collection.set_index(field, &IndexRequest::new(action, [kind]))?;
    for info in collection.indexes()? {
        writeln!(out, "{}\t{}\t{}", info.internal_name(), info.kind, info.records)?;
    }
    Ok(())
}

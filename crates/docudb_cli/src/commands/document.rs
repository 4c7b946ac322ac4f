//! Document commands: `insert`, `find`, `update` and `compact`.

use super::{open, CliResult};
use docudb_codec::Document;
use docudb_core::{Query, QueryMode, QueryOptions};
use std::io::Write;
use std::path::Path;

/// What `find` should return.
#[derive(Debug, Clone, Copy, Default)]
pub struct FindFlags {
    /// Print only the number of matches.
    pub count: bool,
    /// Print at most one document.
    pub one: bool,
    /// Print the execution log to stderr.
    pub log: bool,
}

/// Inserts a JSON document and prints its id.
pub fn insert(path: &Path, collection: &str, json: &str, out: &mut impl Write) -> CliResult<()> {
    let doc = Document::from_json_str(json)?;
    let db = open(path, true)?;
    let oid = db.collection_or_create(collection)?.insert(doc)?;
    writeln!(out, "{oid}")?;
    Ok(())
}

/// Runs a query and prints matching documents as JSON lines.
pub fn find(
    path: &Path,
    collection: &str,
    query: &str,
    hints: Option<&str>,
    flags: FindFlags,
    out: &mut impl Write,
) -> CliResult<()> {
    let mut parsed = Query::parse_json(query)?;
    if let Some(hints) = hints {
        parsed = parsed.with_hints(Document::from_json_str(hints)?)?;
    }
    let db = open(path, parsed.is_update())?;
    let collection = db.get_collection(collection)?;

    let mode = if flags.count {
        QueryMode::Count
    } else if flags.one {
        QueryMode::FindOne
    } else {
        QueryMode::Find
    };
    let result = collection.execute(&parsed, mode, &QueryOptions::new().with_log(flags.log))?;
    if let Some(log) = &result.log {
        eprint!("{log}");
    }
    if flags.count {
        writeln!(out, "{}", result.count)?;
    } else {
        for doc in &result.documents {
            writeln!(out, "{}", doc.to_json_string()?)?;
        }
    }
    Ok(())
}

/// Runs an update-bearing query and prints the number of documents
/// processed.
pub fn update(path: &Path, collection: &str, query: &str, out: &mut impl Write) -> CliResult<()> {
    let parsed = Query::parse_json(query)?;
    let db = open(path, true)?;
    let count = db.get_collection(collection)?.update(&parsed)?;
    writeln!(out, "{count}")?;
    Ok(())
}

/// Compacts a collection's data log.
pub fn compact(path: &Path, collection: &str, out: &mut impl Write) -> CliResult<()> {
    let db = open(path, true)?;
    let stats = db.get_collection(collection)?.compact()?;
    writeln!(
        out,
        "{collection}: {} records, {} -> {} bytes",
        stats.records, stats.bytes_before, stats.bytes_after
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(f: impl FnOnce(&mut Vec<u8>) -> CliResult<()>) -> String {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn insert_find_update() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path();
        output(|o| insert(path, "people", r#"{"name": "Bruce", "age": 58}"#, o));
        output(|o| insert(path, "people", r#"{"name": "Ana", "age": 31}"#, o));

        let found = output(|o| {
            find(path, "people", r#"{"name": {"$begin": "Bru"}}"#, None, FindFlags::default(), o)
        });
        assert_eq!(found.lines().count(), 1);
        assert!(found.contains("Bruce"));

        let flags = FindFlags { count: true, ..FindFlags::default() };
        assert_eq!(output(|o| find(path, "people", "{}", None, flags, o)).trim(), "2");

        let sorted = output(|o| {
            find(path, "people", "{}", Some(r#"{"$orderby": {"age": 1}}"#), FindFlags::default(), o)
        });
        assert!(sorted.lines().next().unwrap().contains("Ana"));

        let updated = output(|o| update(path, "people", r#"{"$inc": {"age": 1}}"#, o));
        assert_eq!(updated.trim(), "2");
    }
}

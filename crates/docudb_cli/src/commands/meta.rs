//! `meta` command: print the database metadata document.

use super::{open, CliResult};
use std::io::Write;
use std::path::Path;

/// Runs the meta command.
pub fn run(path: &Path, out: &mut impl Write) -> CliResult<()> {
    let db = open(path, false)?;
    writeln!(out, "{}", db.metadata()?.to_json_pretty()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docudb_core::Database;

    #[test]
    fn prints_collections() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let db = Database::open(tmp.path()).unwrap();
            db.create_collection("users", None).unwrap();
        }
        let mut out = Vec::new();
        run(tmp.path(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"name\": \"users\""));
    }
}

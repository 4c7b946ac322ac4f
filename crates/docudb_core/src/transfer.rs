//! JSON export and import of collections.
//!
//! Each collection is written to `<name>.json` in the target directory:
//!
//! ```json
//! { "name": "users",
//!   "options": { "large": false, "compressed": false, "records": 0, "cachedrecords": 0 },
//!   "indexes": [ { "field": "age", "type": "number" } ],
//!   "documents": [ { "_id": { "$oid": "..." }, ... } ] }
//! ```

use crate::database::{validate_collection_name, Database};
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexKind, IndexRequest};
use crate::manifest::{options_document, parse_options};
use crate::query::Query;
use docudb_codec::{Document, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const EXPORT_EXTENSION: &str = "json";

/// How imported documents combine with existing collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Merge documents into existing collections by `_id`, creating missing
    /// collections.
    #[default]
    Update,
    /// Drop and recreate each imported collection.
    Replace,
}

impl Database {
    /// Writes the named collections (all when `names` is empty) to
    /// `<dir>/<name>.json`, creating `dir` if needed. Returns the files
    /// written.
    pub fn export(&self, dir: &Path, names: &[&str]) -> CoreResult<Vec<PathBuf>> {
        let collections = if names.is_empty() {
            self.collections()?
        } else {
            names
                .iter()
                .map(|name| self.get_collection(name))
                .collect::<CoreResult<Vec<_>>>()?
        };
        fs::create_dir_all(dir)?;

        let everything = Query::new(Document::new())?;
        let mut written = Vec::with_capacity(collections.len());
        for collection in collections {
            let documents = collection.find(&everything)?.documents;
            let indexes = collection
                .indexes()?
                .into_iter()
                .map(|info| {
                    Value::Document(
                        Document::new()
                            .with("field", info.field)
                            .with("type", info.kind.name()),
                    )
                })
                .collect::<Vec<_>>();
            let count = documents.len();
            let body = Document::new()
                .with("name", collection.name())
                .with("options", options_document(&collection.options()))
                .with("indexes", Value::Array(indexes))
                .with(
                    "documents",
                    Value::Array(documents.into_iter().map(Value::Document).collect()),
                );

            let path = dir.join(format!("{}.{EXPORT_EXTENSION}", collection.name()));
            fs::write(&path, body.to_json_pretty()?)?;
            info!(collection = collection.name(), documents = count, path = %path.display(), "collection exported");
            written.push(path);
        }
        Ok(written)
    }

    /// Loads collections from `<dir>/<name>.json` files (every such file when
    /// `names` is empty). Returns the number of documents imported.
    pub fn import(&self, dir: &Path, names: &[&str], mode: ImportMode) -> CoreResult<usize> {
        let files = if names.is_empty() {
            let mut files = Vec::new();
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some(EXPORT_EXTENSION) {
                    files.push(path);
                }
            }
            files.sort();
            files
        } else {
            names
                .iter()
                .map(|name| dir.join(format!("{name}.{EXPORT_EXTENSION}")))
                .collect()
        };

        let mut imported = 0;
        for file in files {
            imported += self.import_file(&file, mode)?;
        }
        Ok(imported)
    }

    fn import_file(&self, file: &Path, mode: ImportMode) -> CoreResult<usize> {
        let body = Document::from_json_str(&fs::read_to_string(file)?)?;
        let name = match body.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => file
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
                .ok_or_else(|| CoreError::invalid_format(format!("unnamed export file: {}", file.display())))?,
        };
        validate_collection_name(&name)?;
        let options = body
            .get("options")
            .and_then(Value::as_document)
            .map(parse_options)
            .unwrap_or_default();

        if mode == ImportMode::Replace {
            self.drop_collection(&name, true)?;
        }
        let collection = self.create_collection(&name, Some(options))?;

        for index in body.get("indexes").and_then(Value::as_array).unwrap_or(&[]) {
            let entry = index.as_document();
            let field = entry.and_then(|d| d.get("field")).and_then(Value::as_str);
            let kind = entry
                .and_then(|d| d.get("type"))
                .and_then(Value::as_str)
                .and_then(IndexKind::from_name);
            match (field, kind) {
                (Some(field), Some(kind)) => collection.set_index(field, &IndexRequest::create(kind))?,
                _ => return Err(CoreError::invalid_format("malformed index entry in export file")),
            }
        }

        let documents = body.get("documents").and_then(Value::as_array).unwrap_or(&[]);
        collection.transaction(|c| {
            for value in documents {
                let doc = value
                    .as_document()
                    .cloned()
                    .ok_or_else(|| CoreError::type_mismatch("exported documents must be objects"))?;
                c.save(doc, mode == ImportMode::Update)?;
            }
            Ok(())
        })?;
        info!(collection = %name, documents = documents.len(), ?mode, "collection imported");
        Ok(documents.len())
    }
}

//! Database metadata document.

use crate::database::Database;
use crate::error::CoreResult;
use crate::manifest::options_document;
use docudb_codec::{Document, Value};

const MEMORY_FILE: &str = ":memory:";

impl Database {
    /// Describes the database as a document:
    ///
    /// ```text
    /// { file, collections: [ { name, file, records, options,
    ///   indexes: [ { field, iname, type, records, file } ] } ] }
    /// ```
    ///
    /// Collections are sorted by name. In-memory databases report `file` as
    /// `":memory:"` and index entries carry no `file`.
    pub fn metadata(&self) -> CoreResult<Document> {
        let collections = self.collections()?;
        let dir = self.catalog().dir();

        let mut described = Vec::with_capacity(collections.len());
        for collection in &collections {
            let name = collection.name();
            let file = dir.map_or_else(
                || MEMORY_FILE.to_string(),
                |d| d.data_path(name).display().to_string(),
            );

            let indexes = collection
                .indexes()?
                .into_iter()
                .map(|info| {
                    let mut entry = Document::new()
                        .with("field", info.field.as_str())
                        .with("iname", info.internal_name())
                        .with("type", info.kind.name())
                        .with("records", i64::try_from(info.records).unwrap_or(i64::MAX));
                    if let Some(d) = dir {
                        entry.insert(
                            "file",
                            d.index_path(name, &info.field, info.kind).display().to_string(),
                        );
                    }
                    Value::Document(entry)
                })
                .collect::<Vec<_>>();

            described.push(Value::Document(
                Document::new()
                    .with("name", name)
                    .with("file", file)
                    .with("records", i64::try_from(collection.count()?).unwrap_or(i64::MAX))
                    .with("options", options_document(&collection.options()))
                    .with("indexes", Value::Array(indexes)),
            ));
        }

        let file = self
            .path()
            .map_or_else(|| MEMORY_FILE.to_string(), |p| p.display().to_string());
        Ok(Document::new()
            .with("file", file)
            .with("collections", Value::Array(described)))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CollectionOptions;
    use crate::database::Database;
    use crate::index::{IndexKind, IndexRequest};
    use docudb_codec::{Document, Value};
    use tempfile::tempdir;

    #[test]
    fn in_memory_metadata() {
        let db = Database::open_in_memory().unwrap();
        let users = db.create_collection("users", None).unwrap();
        users.insert(Document::new().with("age", 3)).unwrap();
        users.set_index("age", &IndexRequest::create(IndexKind::Number)).unwrap();
        db.create_collection("accounts", None).unwrap();

        let meta = db.metadata().unwrap();
        assert_eq!(meta.get("file").and_then(Value::as_str), Some(":memory:"));
        let collections = meta.get("collections").and_then(Value::as_array).unwrap();
        let names: Vec<&str> = collections
            .iter()
            .filter_map(|c| c.as_document()?.get("name")?.as_str())
            .collect();
        assert_eq!(names, vec!["accounts", "users"]);

        let users = collections[1].as_document().unwrap();
        assert_eq!(users.get("records").and_then(Value::as_i64), Some(1));
        let index = users.get_path("indexes").and_then(Value::as_array).unwrap()[0]
            .as_document()
            .unwrap();
        assert_eq!(index.get("field").and_then(Value::as_str), Some("age"));
        assert_eq!(index.get("iname").and_then(Value::as_str), Some("nage"));
        assert_eq!(index.get("type").and_then(Value::as_str), Some("number"));
        assert_eq!(index.get("records").and_then(Value::as_i64), Some(1));
        assert!(index.get("file").is_none());
    }

    #[test]
    fn file_metadata_names_files() {
        let tmp = tempdir().unwrap();
        let db = Database::open(tmp.path()).unwrap();
        let c = db
            .create_collection("c", Some(CollectionOptions::new().compressed(true)))
            .unwrap();
        c.set_index("s", &IndexRequest::create(IndexKind::IString)).unwrap();

        let meta = db.metadata().unwrap();
        let coll = meta.get("collections").and_then(Value::as_array).unwrap()[0]
            .as_document()
            .unwrap();
        let file = coll.get("file").and_then(Value::as_str).unwrap();
        assert!(file.ends_with("c.data"));
        assert_eq!(coll.get_path("options.compressed"), Some(&Value::Bool(true)));
        let index_file = coll.get_path("indexes").and_then(Value::as_array).unwrap()[0]
            .as_document()
            .and_then(|d| d.get("file"))
            .and_then(Value::as_str)
            .unwrap();
        assert!(index_file.ends_with("c.idx.istring.s"));
    }
}

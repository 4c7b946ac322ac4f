//! Database manifest: the persisted catalog of collections.
//!
//! The manifest is a small header followed by an encoded document:
//!
//! ```text
//! magic "DDMF" | version u16 | document
//! document = { collections: [ { name, options: {...}, indexes: [ { field, type } ] } ] }
//! ```

use crate::config::CollectionOptions;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexKind;
use docudb_codec::{decode_document, encode_document, Document, Value};
use std::collections::BTreeMap;

/// Magic bytes for the manifest file.
pub const MANIFEST_MAGIC: [u8; 4] = *b"DDMF";

/// Current manifest version.
pub const MANIFEST_VERSION: u16 = 1;

/// Persisted description of one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionEntry {
    /// Tuning fixed at creation.
    pub options: CollectionOptions,
    /// Declared indexes as (field path, kind).
    pub indexes: Vec<(String, IndexKind)>,
}

/// The catalog of collections, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    /// Collections by name.
    pub collections: BTreeMap<String, CollectionEntry>,
}

impl Manifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes the manifest to bytes.
    ///
    /// # Errors
    ///
    /// Fails only if a name cannot be encoded (interior NUL).
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let collections: Vec<Value> = self
            .collections
            .iter()
            .map(|(name, entry)| {
                let indexes = entry
                    .indexes
                    .iter()
                    .map(|(field, kind)| {
                        Value::Document(
                            Document::new()
                                .with("field", field.as_str())
                                .with("type", kind.name()),
                        )
                    })
                    .collect();
                Value::Document(
                    Document::new()
                        .with("name", name.as_str())
                        .with("options", options_document(&entry.options))
                        .with("indexes", Value::Array(indexes)),
                )
            })
            .collect();
        let body = encode_document(&Document::new().with("collections", Value::Array(collections)))?;

        let mut buf = Vec::with_capacity(6 + body.len());
        buf.extend_from_slice(&MANIFEST_MAGIC);
        buf.extend_from_slice(&MANIFEST_VERSION.to_le_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Decodes a manifest from bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` for a bad header or unexpected structure and
    /// `MalformedDocument` for a corrupt body.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < 6 || data[0..4] != MANIFEST_MAGIC {
            return Err(CoreError::invalid_format("invalid manifest magic"));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version > MANIFEST_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported manifest version: {version}"
            )));
        }
        let body = decode_document(&data[6..])?;

        let mut manifest = Self::new();
        let entries = body
            .get("collections")
            .and_then(Value::as_array)
            .ok_or_else(|| CoreError::invalid_format("manifest without collections"))?;
        for entry in entries {
            let entry = entry
                .as_document()
                .ok_or_else(|| CoreError::invalid_format("collection entry is not a document"))?;
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| CoreError::invalid_format("collection entry without name"))?;
            let options = entry
                .get("options")
                .and_then(Value::as_document)
                .map(parse_options)
                .unwrap_or_default();
            let mut indexes = Vec::new();
            for index in entry.get("indexes").and_then(Value::as_array).unwrap_or(&[]) {
                let field = index.as_document().and_then(|d| d.get("field")).and_then(Value::as_str);
                let kind = index
                    .as_document()
                    .and_then(|d| d.get("type"))
                    .and_then(Value::as_str)
                    .and_then(IndexKind::from_name);
                match (field, kind) {
                    (Some(field), Some(kind)) => indexes.push((field.to_string(), kind)),
                    _ => return Err(CoreError::invalid_format("malformed index entry")),
                }
            }
            manifest
                .collections
                .insert(name.to_string(), CollectionEntry { options, indexes });
        }
        Ok(manifest)
    }
}

/// Options as reported in the manifest and in metadata.
pub(crate) fn options_document(options: &CollectionOptions) -> Document {
    Document::new()
        .with("large", options.large)
        .with("compressed", options.compressed)
        .with("records", i64::try_from(options.records).unwrap_or(i64::MAX))
        .with("cachedrecords", i64::from(options.cached_records))
}

pub(crate) fn parse_options(doc: &Document) -> CollectionOptions {
    let flag = |key: &str| matches!(doc.get(key), Some(Value::Bool(true)));
    let number = |key: &str| doc.get(key).and_then(Value::as_i64).unwrap_or(0).max(0);
    CollectionOptions::new()
        .large(flag("large"))
        .compressed(flag("compressed"))
        .records(number("records").unsigned_abs())
        .cached_records(u32::try_from(number("cachedrecords")).unwrap_or(u32::MAX))
}

//! Ordered documents and dot-separated field paths.

use crate::error::{CodecError, CodecResult};
use crate::oid::ObjectId;
use crate::value::Value;

/// Name of the identifier field every stored document carries.
pub const ID_FIELD: &str = "_id";

/// An ordered list of named fields.
///
/// Field order is preserved through encoding, decoding and JSON conversion.
/// Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty document with room for `capacity` fields.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Builder form of [`Document::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Looks up a top-level field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Mutable lookup of a top-level field.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Whether a top-level field exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets a top-level field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.get_mut(&key) {
            return Some(std::mem::replace(slot, value));
        }
        self.fields.push((key, value));
        None
    }

    /// Removes a top-level field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(pos).1)
    }

    /// Resolves a dot-separated path. Numeric segments index into arrays.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Document(doc) => doc.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Whether a dot-separated path resolves.
    #[must_use]
    pub fn contains_path(&self, path: &str) -> bool {
        self.get_path(path).is_some()
    }

    /// Sets a value at a dot-separated path, creating missing intermediate
    /// documents. An array segment may address an existing element or the
    /// position just past the end.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::PathConflict`] if the path is empty, contains an
    /// empty segment, or runs through a scalar value.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> CodecResult<()> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(CodecError::path_conflict(path));
        }
        set_in_document(self, &segments, value.into(), path)
    }

    /// Removes the value at a dot-separated path.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        match path.rsplit_once('.') {
            None => self.remove(path),
            Some((parent, leaf)) => match self.get_path_mut(parent)? {
                Value::Document(doc) => doc.remove(leaf),
                Value::Array(items) => {
                    let idx = leaf.parse::<usize>().ok()?;
                    (idx < items.len()).then(|| items.remove(idx))
                }
                _ => None,
            },
        }
    }

    /// Mutable form of [`Document::get_path`].
    pub fn get_path_mut(&mut self, path: &str) -> Option<&mut Value> {
        let mut segments = path.split('.');
        let mut current = self.get_mut(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Document(doc) => doc.get_mut(segment)?,
                Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// The `_id` field, if it holds an object id.
    #[must_use]
    pub fn id(&self) -> Option<ObjectId> {
        self.get(ID_FIELD).and_then(Value::as_object_id)
    }

    /// Sets `_id`, moving it to the front of the document.
    pub fn set_id(&mut self, oid: ObjectId) {
        self.remove(ID_FIELD);
        self.fields.insert(0, (ID_FIELD.to_string(), Value::ObjectId(oid)));
    }

    /// Copies every top-level field of `other` over this document.
    pub fn merge(&mut self, other: &Document) {
        for (key, value) in other.iter() {
            self.insert(key, value.clone());
        }
    }

    /// Consumes the document, returning its fields.
    #[must_use]
    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

fn set_in_document(
    doc: &mut Document,
    segments: &[&str],
    value: Value,
    path: &str,
) -> CodecResult<()> {
    let Some((head, rest)) = segments.split_first() else {
        return Err(CodecError::path_conflict(path));
    };
    if rest.is_empty() {
        doc.insert(*head, value);
        return Ok(());
    }
    if !doc.contains_key(head) {
        doc.insert(*head, Document::new());
    }
    let child = doc
        .get_mut(head)
        .ok_or_else(|| CodecError::path_conflict(path))?;
    set_in_value(child, rest, value, path)
}

fn set_in_value(target: &mut Value, segments: &[&str], value: Value, path: &str) -> CodecResult<()> {
    match target {
        Value::Document(doc) => set_in_document(doc, segments, value, path),
        Value::Array(items) => {
            let Some((head, rest)) = segments.split_first() else {
                return Err(CodecError::path_conflict(path));
            };
            let idx = head
                .parse::<usize>()
                .map_err(|_| CodecError::path_conflict(path))?;
            if idx > items.len() {
                return Err(CodecError::path_conflict(path));
            }
            if rest.is_empty() {
                if idx == items.len() {
                    items.push(value);
                } else {
                    items[idx] = value;
                }
                return Ok(());
            }
            if idx == items.len() {
                items.push(Value::Document(Document::new()));
            }
            set_in_value(&mut items[idx], rest, value, path)
        }
        _ => Err(CodecError::path_conflict(path)),
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (key, value) in iter {
            doc.insert(key, value);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Document {
        Document::new()
            .with("name", "Bruce")
            .with(
                "address",
                Document::new().with("city", "Gotham").with("zip", 10001),
            )
            .with(
                "tags",
                Value::Array(vec![Value::from("a"), Value::from("b")]),
            )
    }

    #[test]
    fn insert_keeps_order_and_replaces_in_place() {
        let mut doc = Document::new().with("a", 1).with("b", 2);
        assert_eq!(doc.insert("a", 10), Some(Value::Int(1)));
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(doc.get("a"), Some(&Value::Int(10)));
    }

    #[test]
    fn get_path_walks_documents_and_arrays() {
        let doc = person();
        assert_eq!(doc.get_path("address.city"), Some(&Value::from("Gotham")));
        assert_eq!(doc.get_path("tags.1"), Some(&Value::from("b")));
        assert_eq!(doc.get_path("tags.2"), None);
        assert_eq!(doc.get_path("name.first"), None);
        assert!(doc.contains_path("address.zip"));
    }

    #[test]
    fn set_path_creates_intermediates() {
        let mut doc = Document::new();
        doc.set_path("a.b.c", 1).unwrap();
        assert_eq!(doc.get_path("a.b.c"), Some(&Value::Int(1)));

        let mut doc = person();
        doc.set_path("tags.2", "c").unwrap();
        assert_eq!(doc.get_path("tags.2"), Some(&Value::from("c")));
        doc.set_path("tags.0", "z").unwrap();
        assert_eq!(doc.get_path("tags.0"), Some(&Value::from("z")));
    }

    #[test]
    fn set_path_through_scalar_conflicts() {
        let mut doc = person();
        assert!(matches!(
            doc.set_path("name.first", "x"),
            Err(CodecError::PathConflict { .. })
        ));
        assert!(doc.set_path("tags.9", 1).is_err());
        assert!(doc.set_path("a..b", 1).is_err());
    }

    #[test]
    fn remove_path_removes_nested_fields() {
        let mut doc = person();
        assert_eq!(doc.remove_path("address.zip"), Some(Value::Int(10001)));
        assert!(!doc.contains_path("address.zip"));
        assert_eq!(doc.remove_path("tags.0"), Some(Value::from("a")));
        assert_eq!(doc.get_path("tags.0"), Some(&Value::from("b")));
        assert_eq!(doc.remove_path("missing.field"), None);
    }

    #[test]
    fn set_id_moves_id_first() {
        let mut doc = person();
        let oid = ObjectId::new();
        doc.set_id(oid);
        assert_eq!(doc.keys().next(), Some(ID_FIELD));
        assert_eq!(doc.id(), Some(oid));
    }

    #[test]
    fn merge_overlays_fields() {
        let mut doc = Document::new().with("a", 1).with("b", 2);
        doc.merge(&Document::new().with("b", 3).with("c", 4));
        assert_eq!(doc, Document::new().with("a", 1).with("b", 3).with("c", 4));
    }
}

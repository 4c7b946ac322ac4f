//! Index kinds and key construction.

use crate::error::{CoreError, CoreResult};
use crate::fieldpath;
use docudb_codec::{Document, Value};
use std::cmp::Ordering;
use std::fmt;

/// Type-tag of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKind {
    /// Numeric keys, ordered by value regardless of int/double form.
    Number,
    /// Lexicographic string keys.
    String,
    /// Case-folded string keys.
    IString,
    /// One key per array element or whitespace-delimited token.
    Array,
}

impl IndexKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 4] = [Self::Number, Self::String, Self::IString, Self::Array];

    /// Name reported in metadata and used in index file names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::String => "string",
            Self::IString => "istring",
            Self::Array => "token",
        }
    }

    /// Single-letter prefix of the index's internal name.
    #[must_use]
    pub const fn prefix(self) -> char {
        match self {
            Self::Number => 'n',
            Self::String => 's',
            Self::IString => 'i',
            Self::Array => 'a',
        }
    }

    /// Parses a kind from its [`name`](Self::name).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            "istring" => Some(Self::IString),
            "token" | "array" => Some(Self::Array),
            _ => None,
        }
    }

    pub(crate) const fn to_byte(self) -> u8 {
        match self {
            Self::Number => 0,
            Self::String => 1,
            Self::IString => 2,
            Self::Array => 3,
        }
    }

    pub(crate) const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Number),
            1 => Some(Self::String),
            2 => Some(Self::IString),
            3 => Some(Self::Array),
            _ => None,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Totally ordered wrapper for finite `f64` keys.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NumberKey(f64);

impl NumberKey {
    /// Wraps a finite number; `-0.0` is folded into `0.0`.
    pub(crate) fn new(n: f64) -> Option<Self> {
        if !n.is_finite() {
            return None;
        }
        Some(Self(if n == 0.0 { 0.0 } else { n }))
    }

    pub(crate) const fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for NumberKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NumberKey {}

impl PartialOrd for NumberKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumberKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A key stored in a field index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum IndexKey {
    Number(NumberKey),
    Text(String),
}

impl IndexKey {
    pub(crate) fn number(n: f64) -> Option<Self> {
        NumberKey::new(n).map(Self::Number)
    }
}

/// Numeric view of a value: numbers, booleans as `0`/`1`.
pub(crate) fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Double(d) => Some(*d),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Renders a scalar the way string and token indexes store it.
pub(crate) fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Double(d) => Some(render_double(*d)),
        Value::Bool(b) => Some(b.to_string()),
        Value::ObjectId(oid) => Some(oid.to_hex()),
        _ => None,
    }
}

fn render_double(d: f64) -> String {
    if d.fract() == 0.0 && d.abs() < 9_007_199_254_740_992.0 {
        (d as i64).to_string()
    } else {
        d.to_string()
    }
}

/// Splits a string into tokens on whitespace and commas.
pub(crate) fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
}

/// The tokens a value contributes to a token match or an array index.
///
/// Returns `Err(())` if the value holds a nested document.
pub(crate) fn value_tokens(value: &Value) -> Result<Vec<String>, ()> {
    match value {
        Value::String(s) => Ok(tokenize(s).map(str::to_string).collect()),
        Value::Array(items) => {
            let mut tokens = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Document(_) => return Err(()),
                    other => tokens.extend(render_scalar(other)),
                }
            }
            Ok(tokens)
        }
        Value::Document(_) => Err(()),
        other => Ok(render_scalar(other).into_iter().collect()),
    }
}

/// Keys a single scalar contributes to an index of `kind`.
fn scalar_keys(kind: IndexKind, value: &Value, out: &mut Vec<IndexKey>) {
    match kind {
        IndexKind::Number => {
            let n = match value {
                Value::String(s) => s.trim().parse::<f64>().ok(),
                other => numeric(other),
            };
            out.extend(n.and_then(IndexKey::number));
        }
        IndexKind::String => out.extend(render_scalar(value).map(IndexKey::Text)),
        IndexKind::IString => {
            if let Value::String(s) = value {
                out.push(IndexKey::Text(s.to_lowercase()));
            }
        }
        IndexKind::Array => {}
    }
}

/// Computes every key `doc` contributes to an index of `kind` on `path`.
///
/// Under `strict`, a nested document in an array-indexed field is an error;
/// otherwise such values are skipped.
pub(crate) fn document_keys(
    kind: IndexKind,
    path: &str,
    doc: &Document,
    strict: bool,
) -> CoreResult<Vec<IndexKey>> {
    let mut keys = Vec::new();
    for value in fieldpath::resolve(doc, path) {
        if kind == IndexKind::Array {
            match value_tokens(value) {
                Ok(tokens) => keys.extend(tokens.into_iter().map(IndexKey::Text)),
                Err(()) if strict => {
                    return Err(CoreError::index_error(
                        path,
                        "token index cannot hold a nested document",
                    ))
                }
                Err(()) => {}
            }
            continue;
        }
        match value {
            Value::Array(items) => {
                for item in items {
                    scalar_keys(kind, item, &mut keys);
                }
            }
            other => scalar_keys(kind, other, &mut keys),
        }
    }
    keys.sort();
    keys.dedup();
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: &str) -> Document {
        Document::from_json_str(json).unwrap()
    }

    fn texts(keys: &[IndexKey]) -> Vec<&str> {
        keys.iter()
            .map(|k| match k {
                IndexKey::Text(t) => t.as_str(),
                IndexKey::Number(_) => panic!("unexpected number key"),
            })
            .collect()
    }

    #[test]
    fn number_keys_unify_int_and_double() {
        let a = document_keys(IndexKind::Number, "n", &doc(r#"{"n": 3}"#), true).unwrap();
        let b = document_keys(IndexKind::Number, "n", &doc(r#"{"n": 3.0}"#), true).unwrap();
        assert_eq!(a, b);
        let c = document_keys(IndexKind::Number, "n", &doc(r#"{"n": "3"}"#), true).unwrap();
        assert_eq!(a, c);
        assert!(document_keys(IndexKind::Number, "n", &doc(r#"{"n": "x"}"#), true)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn number_key_order() {
        let mut keys: Vec<_> = [5.0, -1.5, 0.0, -0.0, 2.0]
            .iter()
            .filter_map(|n| IndexKey::number(*n))
            .collect();
        keys.sort();
        keys.dedup();
        let nums: Vec<f64> = keys
            .iter()
            .map(|k| match k {
                IndexKey::Number(n) => n.get(),
                IndexKey::Text(_) => unreachable!(),
            })
            .collect();
        assert_eq!(nums, vec![-1.5, 0.0, 2.0, 5.0]);
        assert!(IndexKey::number(f64::NAN).is_none());
    }

    #[test]
    fn string_keys_render_scalars() {
        let keys = document_keys(IndexKind::String, "v", &doc(r#"{"v": [1, 2.0, "x", true]}"#), true)
            .unwrap();
        assert_eq!(texts(&keys), vec!["1", "2", "true", "x"]);
    }

    #[test]
    fn istring_folds_case() {
        let keys = document_keys(IndexKind::IString, "v", &doc(r#"{"v": "HeLLo"}"#), true).unwrap();
        assert_eq!(texts(&keys), vec!["hello"]);
    }

    #[test]
    fn token_keys_split_strings_and_arrays() {
        let keys =
            document_keys(IndexKind::Array, "t", &doc(r#"{"t": "red, green  blue"}"#), true).unwrap();
        assert_eq!(texts(&keys), vec!["blue", "green", "red"]);

        let keys = document_keys(IndexKind::Array, "t", &doc(r#"{"t": ["a b", "c", 4]}"#), true)
            .unwrap();
        assert_eq!(texts(&keys), vec!["4", "a b", "c"]);
    }

    #[test]
    fn token_index_rejects_nested_documents_when_strict() {
        let d = doc(r#"{"t": [{"x": 1}]}"#);
        assert!(matches!(
            document_keys(IndexKind::Array, "t", &d, true),
            Err(CoreError::IndexError { .. })
        ));
        assert!(document_keys(IndexKind::Array, "t", &d, false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in IndexKind::ALL {
            assert_eq!(IndexKind::from_name(kind.name()), Some(kind));
            assert_eq!(IndexKind::from_byte(kind.to_byte()), Some(kind));
        }
    }
}

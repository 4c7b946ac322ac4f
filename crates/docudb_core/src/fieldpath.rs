//! Dot-separated field path resolution for matching and indexing.

use docudb_codec::{Document, Value};

/// Resolves `path` against `doc`, fanning out across arrays.
///
/// A numeric segment addresses an array element; any other segment applied
/// to an array descends into every element that is a document. Missing
/// fields contribute nothing.
pub(crate) fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some(value) = doc.get(segments[0]) {
        descend(value, &segments[1..], &mut out);
    }
    out
}

fn descend<'a>(value: &'a Value, rest: &[&str], out: &mut Vec<&'a Value>) {
    let Some((segment, tail)) = rest.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Document(doc) => {
            if let Some(child) = doc.get(segment) {
                descend(child, tail, out);
            }
        }
        Value::Array(items) => {
            if let Ok(idx) = segment.parse::<usize>() {
                if let Some(child) = items.get(idx) {
                    descend(child, tail, out);
                }
            } else {
                for item in items {
                    if let Value::Document(doc) = item {
                        if let Some(child) = doc.get(segment) {
                            descend(child, tail, out);
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

/// Whether a field path is syntactically usable.
pub(crate) fn is_valid(path: &str) -> bool {
    !path.is_empty() && !path.contains('$') && path.split('.').all(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::from_json_str(
            r#"{"a": {"b": 1}, "list": [{"x": 1}, {"x": 2}, 7], "tags": ["p", "q"]}"#,
        )
        .unwrap()
    }

    #[test]
    fn resolves_nested_fields() {
        let doc = sample();
        assert_eq!(resolve(&doc, "a.b"), vec![&Value::Int(1)]);
        assert!(resolve(&doc, "a.c").is_empty());
        assert!(resolve(&doc, "missing").is_empty());
    }

    #[test]
    fn fans_out_across_arrays() {
        let doc = sample();
        assert_eq!(resolve(&doc, "list.x"), vec![&Value::Int(1), &Value::Int(2)]);
        assert_eq!(resolve(&doc, "list.2"), vec![&Value::Int(7)]);
        assert_eq!(resolve(&doc, "tags.1"), vec![&Value::from("q")]);
    }

    #[test]
    fn path_validity() {
        assert!(is_valid("a.b"));
        assert!(!is_valid(""));
        assert!(!is_valid("a..b"));
        assert!(!is_valid("$set"));
    }
}

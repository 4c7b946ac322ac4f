//! Field mutation operators and `$do` result actions.

use crate::error::{CoreError, CoreResult};
use crate::query::ast::{DoAction, UpdateSpec};
use crate::query::matcher::equals;
use docudb_codec::{Document, ObjectId, Value, ID_FIELD};

/// Applies every update operator to a copy of `doc`.
///
/// Operators run in a fixed order: rename, unset, set/upsert, inc,
/// addToSet, push, pull. `_id` is never modified. On error the input is
/// left as it was.
pub(crate) fn apply_update(spec: &UpdateSpec, doc: &Document) -> CoreResult<Document> {
    let mut out = doc.clone();

    for (from, to) in &spec.rename {
        if from == ID_FIELD || to == ID_FIELD {
            continue;
        }
        if let Some(value) = out.remove_path(from) {
            out.set_path(to, value)?;
        }
    }
    for path in spec.unset.iter().filter(|p| p.as_str() != ID_FIELD) {
        out.remove_path(path);
    }
    for fields in spec.set.iter().chain(spec.upsert.iter()) {
        for (path, value) in fields.iter().filter(|(p, _)| *p != ID_FIELD) {
            out.set_path(path, value.clone())?;
        }
    }
    for (path, delta) in &spec.inc {
        increment(&mut out, path, delta)?;
    }
    for (path, values) in &spec.add_to_set {
        append(&mut out, path, values, "$addToSet", true)?;
    }
    for (path, values) in &spec.push {
        append(&mut out, path, values, "$push", false)?;
    }
    for (path, values) in &spec.pull {
        if let Some(Value::Array(items)) = out.get_path_mut(path) {
            items.retain(|item| !values.iter().any(|v| equals(item, v, false)));
        }
    }
    Ok(out)
}

#[allow(clippy::cast_precision_loss)]
fn increment(doc: &mut Document, path: &str, delta: &Value) -> CoreResult<()> {
    if path == ID_FIELD {
        return Err(CoreError::type_mismatch("$inc cannot target _id"));
    }
    let Some(current) = doc.get_path_mut(path) else {
        doc.set_path(path, delta.clone())?;
        return Ok(());
    };
    let next = match (&*current, delta) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map_or(Value::Double(*a as f64 + *b as f64), Value::Int),
        (Value::Int(a), Value::Double(b)) => Value::Double(*a as f64 + b),
        (Value::Double(a), Value::Int(b)) => Value::Double(a + *b as f64),
        (Value::Double(a), Value::Double(b)) => Value::Double(a + b),
        (other, _) => {
            return Err(CoreError::type_mismatch(format!(
                "$inc on '{path}' which holds {}",
                other.type_name()
            )))
        }
    };
    *current = next;
    Ok(())
}

fn append(
    doc: &mut Document,
    path: &str,
    values: &[Value],
    op: &str,
    unique: bool,
) -> CoreResult<()> {
    match doc.get_path_mut(path) {
        Some(Value::Array(items)) => {
            for value in values {
                if !unique || !items.iter().any(|i| equals(i, value, false)) {
                    items.push(value.clone());
                }
            }
            Ok(())
        }
        Some(other) => Err(CoreError::type_mismatch(format!(
            "{op} on '{path}' which holds {}",
            other.type_name()
        ))),
        None => {
            let mut items: Vec<Value> = Vec::with_capacity(values.len());
            for value in values {
                if !unique || !items.iter().any(|i| equals(i, value, false)) {
                    items.push(value.clone());
                }
            }
            doc.set_path(path, Value::Array(items))?;
            Ok(())
        }
    }
}

/// Shapes a returned document with `$do` actions. `join` resolves an id in
/// a named collection.
pub(crate) fn apply_actions<F>(doc: &mut Document, actions: &[(String, DoAction)], join: F)
where
    F: Fn(&str, &ObjectId) -> Option<Document>,
{
    for (path, action) in actions {
        let Some(target) = doc.get_path_mut(path) else {
            continue;
        };
        match action {
            DoAction::Join(collection) => match target {
                Value::Array(items) => {
                    for item in items {
                        resolve_reference(item, collection, &join);
                    }
                }
                other => resolve_reference(other, collection, &join),
            },
            DoAction::Slice { skip, limit } => {
                if let Value::Array(items) = target {
                    *items = slice(std::mem::take(items), *skip, *limit);
                }
            }
        }
    }
}

fn resolve_reference<F>(value: &mut Value, collection: &str, join: &F)
where
    F: Fn(&str, &ObjectId) -> Option<Document>,
{
    let oid = match value {
        Value::ObjectId(oid) => *oid,
        Value::String(s) => match ObjectId::parse_str(s) {
            Ok(oid) => oid,
            Err(_) => return,
        },
        _ => return,
    };
    if let Some(found) = join(collection, &oid) {
        *value = Value::Document(found);
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn slice(items: Vec<Value>, skip: i64, limit: usize) -> Vec<Value> {
    let count = items.len();
    if count == 0 {
        return items;
    }
    let start = if skip < 0 {
        let back = count as i64 + skip % count as i64;
        back as usize
    } else {
        usize::try_from(skip).unwrap_or(usize::MAX)
    };
    items.into_iter().skip(start).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse::parse_query;

    fn doc(json: &str) -> Document {
        Document::from_json_str(json).unwrap()
    }

    fn update(query: &str, target: &str) -> CoreResult<Document> {
        let parsed = parse_query(&doc(query)).unwrap();
        apply_update(&parsed.update, &doc(target))
    }

    #[test]
    fn set_and_unset() {
        let out = update(
            r#"{"$set": {"a.b": 1, "c": "x"}, "$unset": {"d": 1}}"#,
            r#"{"c": "old", "d": true}"#,
        )
        .unwrap();
        assert_eq!(out, doc(r#"{"c": "x", "a": {"b": 1}}"#));
    }

    #[test]
    fn id_is_immutable() {
        let oid = ObjectId::new();
        let mut target = doc(r#"{"n": 1}"#);
        target.set_id(oid);
        let parsed = parse_query(&doc(
            r#"{"$set": {"_id": "000000000000000000000000", "n": 2}, "$unset": {"_id": 1}}"#,
        ))
        .unwrap();
        let out = apply_update(&parsed.update, &target).unwrap();
        assert_eq!(out.id(), Some(oid));
        assert_eq!(out.get("n"), Some(&Value::Int(2)));
    }

    #[test]
    fn increments() {
        let out = update(r#"{"$inc": {"n": 2, "m": 1.5, "new": 3}}"#, r#"{"n": 1, "m": 1}"#).unwrap();
        assert_eq!(out.get("n"), Some(&Value::Int(3)));
        assert_eq!(out.get("m"), Some(&Value::Double(2.5)));
        assert_eq!(out.get("new"), Some(&Value::Int(3)));

        let overflow = update(r#"{"$inc": {"n": 1}}"#, &format!(r#"{{"n": {}}}"#, i64::MAX)).unwrap();
        assert!(matches!(overflow.get("n"), Some(Value::Double(_))));

        assert!(matches!(
            update(r#"{"$inc": {"s": 1}}"#, r#"{"s": "text"}"#),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn array_operators() {
        let out = update(
            r#"{"$addToSet": {"tags": "a"}, "$push": {"log": 1}, "$pull": {"nums": 2}}"#,
            r#"{"tags": ["a", "b"], "log": [1], "nums": [1, 2, 3, 2.0]}"#,
        )
        .unwrap();
        assert_eq!(
            out,
            doc(r#"{"tags": ["a", "b"], "log": [1, 1], "nums": [1, 3]}"#)
        );

        let out = update(
            r#"{"$addToSetAll": {"tags": ["x", "x", "y"]}, "$pullAll": {"missing": [1]}}"#,
            r#"{}"#,
        )
        .unwrap();
        assert_eq!(out, doc(r#"{"tags": ["x", "y"]}"#));
    }

    #[test]
    fn failed_operator_leaves_input_untouched() {
        let target = doc(r#"{"n": "x", "tags": 5}"#);
        let parsed = parse_query(&doc(r#"{"$set": {"a": 1}, "$push": {"tags": 1}}"#)).unwrap();
        assert!(apply_update(&parsed.update, &target).is_err());
        assert_eq!(target, doc(r#"{"n": "x", "tags": 5}"#));
    }

    #[test]
    fn rename_moves_values() {
        let out = update(r#"{"$rename": {"a": "b.c"}}"#, r#"{"a": 1, "z": 0}"#).unwrap();
        assert_eq!(out, doc(r#"{"z": 0, "b": {"c": 1}}"#));
    }

    #[test]
    fn slices() {
        let items: Vec<Value> = (0..5).map(Value::Int).collect();
        assert_eq!(slice(items.clone(), 0, 2), vec![Value::Int(0), Value::Int(1)]);
        assert_eq!(slice(items.clone(), -2, 5), vec![Value::Int(3), Value::Int(4)]);
        assert_eq!(slice(items.clone(), 1, 1), vec![Value::Int(1)]);
        assert!(slice(items, 9, 1).is_empty());
    }

    #[test]
    fn join_replaces_references() {
        let (known, unknown) = (ObjectId::new(), ObjectId::new());
        let mut target = Document::new()
            .with("one", Value::ObjectId(known))
            .with("many", Value::Array(vec![
                Value::String(known.to_hex()),
                Value::ObjectId(unknown),
            ]));
        let actions = vec![
            ("one".to_string(), DoAction::Join("people".into())),
            ("many".to_string(), DoAction::Join("people".into())),
        ];
        apply_actions(&mut target, &actions, |coll, oid| {
            (coll == "people" && *oid == known).then(|| Document::new().with("name", "Ann"))
        });
        let person = Value::Document(Document::new().with("name", "Ann"));
        assert_eq!(target.get("one"), Some(&person));
        assert_eq!(
            target.get("many"),
            Some(&Value::Array(vec![person, Value::ObjectId(unknown)]))
        );
    }
}

//! Property-based test generators using proptest.

use docudb_core::{Document, ObjectId, Value};
use proptest::prelude::*;

/// Strategy for generating valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for field names. Never `_id` and never `$`-prefixed.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,7}").expect("Invalid regex")
}

/// Strategy for object ids.
pub fn object_id_strategy() -> impl Strategy<Value = ObjectId> {
    any::<[u8; 12]>().prop_map(ObjectId::from_bytes)
}

/// Strategy for scalar values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-1.0e9f64..1.0e9).prop_map(Value::Double),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Binary),
        object_id_strategy().prop_map(Value::ObjectId),
    ]
}

/// Strategy for values nested up to three levels deep.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec((field_name_strategy(), inner), 0..4)
                .prop_map(|fields| Value::Document(unique_fields(fields))),
        ]
    })
}

/// Strategy for documents without an `_id`.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::vec((field_name_strategy(), value_strategy()), 0..8).prop_map(unique_fields)
}

/// Strategy for documents whose `field` holds a small number, a numeric
/// string, some other type, or nothing.
pub fn numeric_field_strategy(field: &'static str) -> impl Strategy<Value = Document> {
    let value = prop_oneof![
        4 => (-50i64..50).prop_map(Value::Int),
        2 => (-50.0f64..50.0).prop_map(Value::Double),
        1 => (-50i64..50).prop_map(|n| Value::String(n.to_string())),
        1 => Just(Value::Bool(true)),
        1 => Just(Value::Null),
    ];
    (prop::option::of(value), any::<u8>()).prop_map(move |(value, tag)| {
        let mut doc = Document::new().with("tag", i64::from(tag));
        if let Some(value) = value {
            doc.insert(field, value);
        }
        doc
    })
}

/// Strategy for a numeric comparison operator and bound.
pub fn comparison_strategy() -> impl Strategy<Value = (&'static str, i64)> {
    (prop::sample::select(vec!["$gt", "$gte", "$lt", "$lte"]), -60i64..60)
}

fn unique_fields(fields: Vec<(String, Value)>) -> Document {
    let mut doc = Document::new();
    for (key, value) in fields {
        if !doc.contains_key(&key) {
            doc.insert(key, value);
        }
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn generated_names_are_valid() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let name = collection_name_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert!(docudb_core::validate_collection_name(&name).is_ok(), "{name}");
        }
    }

    #[test]
    fn documents_have_no_id() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let doc = document_strategy().new_tree(&mut runner).unwrap().current();
            assert!(doc.id().is_none());
        }
    }
}

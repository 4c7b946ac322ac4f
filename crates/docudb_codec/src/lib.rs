//! # DocuDB Codec
//!
//! The document model of DocuDB and its two representations.
//!
//! - [`Document`] is an ordered list of named [`Value`]s. Nested fields are
//!   addressed with dot-separated paths (`"address.city"`, `"tags.0"`).
//! - [`ObjectId`] is the 12-byte identifier every stored document carries in
//!   its `_id` field.
//! - The binary form is a self-describing, length-prefixed layout compatible
//!   with BSON for the supported types. Encoding is canonical: the same field
//!   sequence always yields the same bytes.
//! - The JSON text form round-trips losslessly through `serde_json`, with
//!   `{"$oid": ...}` and `{"$binary": ...}` wrappers for the non-JSON types.
//!
//! ## Usage
//!
//! ```
//! use docudb_codec::{decode_document, encode_document, Document, Value};
//!
//! let doc = Document::new().with("name", "Bruce").with("age", 58);
//! let bytes = encode_document(&doc).unwrap();
//! let decoded = decode_document(&bytes).unwrap();
//! assert_eq!(decoded.get("age"), Some(&Value::Int(58)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod document;
mod encoder;
mod error;
mod json;
mod oid;
mod value;

pub use decoder::{decode_document, DocumentDecoder, MAX_NESTING};
pub use document::{Document, ID_FIELD};
pub use encoder::{encode_document, DocumentEncoder};
pub use error::{CodecError, CodecResult};
pub use json::from_json;
pub use oid::ObjectId;
pub use value::Value;

/// Types that encode to the binary document form.
pub trait Encode {
    /// Encode this value to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that decode from the binary document form.
pub trait Decode: Sized {
    /// Decode a value from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Document {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        encode_document(self)
    }
}

impl Decode for Document {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        decode_document(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            (-1.0e12f64..1.0e12).prop_map(Value::Double),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
            proptest::collection::vec(any::<u8>(), 0..8).prop_map(Value::Binary),
            any::<[u8; 12]>().prop_map(|b| Value::ObjectId(ObjectId::from_bytes(b))),
        ]
    }

    fn value() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                proptest::collection::vec(("[a-z]{1,6}", inner), 0..4)
                    .prop_map(|fields| Value::Document(fields.into_iter().collect())),
            ]
        })
    }

    fn document() -> impl Strategy<Value = Document> {
        proptest::collection::vec(("[a-z_]{1,8}", value()), 0..6)
            .prop_map(|fields| fields.into_iter().collect())
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(doc in document()) {
            let bytes = doc.encode().unwrap();
            prop_assert_eq!(Document::decode(&bytes).unwrap(), doc);
        }

        #[test]
        fn json_inverts_to_json(doc in document()) {
            let text = doc.to_json_string().unwrap();
            let parsed = Document::from_json_str(&text).unwrap();
            prop_assert_eq!(encode_document(&parsed).unwrap().len(), encode_document(&doc).unwrap().len());
        }
    }
}

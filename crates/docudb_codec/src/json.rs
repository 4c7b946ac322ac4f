//! JSON text form of documents.
//!
//! Object ids are written as `{"$oid": "<24 hex>"}` and binary values as
//! `{"$binary": "<hex>"}`; both forms are recognized again on input.
//! Integers that fit `i64` parse as [`Value::Int`], every other number as
//! [`Value::Double`].

use crate::document::Document;
use crate::error::{CodecError, CodecResult};
use crate::oid::ObjectId;
use crate::value::Value;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value as Json;

const OID_KEY: &str = "$oid";
const BINARY_KEY: &str = "$binary";

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Double(d) if d.is_finite() => serializer.serialize_f64(*d),
            Value::Double(_) => serializer.serialize_unit(),
            Value::String(s) => serializer.serialize_str(s),
            Value::Binary(data) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(BINARY_KEY, &to_hex(data))?;
                map.end()
            }
            Value::ObjectId(oid) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(OID_KEY, &oid.to_hex())?;
                map.end()
            }
            Value::Document(doc) => doc.serialize(serializer),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        match from_json(json).map_err(serde::de::Error::custom)? {
            Value::Document(doc) => Ok(doc),
            _ => Err(serde::de::Error::custom(CodecError::NotADocument)),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        from_json(json).map_err(serde::de::Error::custom)
    }
}

/// Converts a parsed JSON value into a document value.
///
/// # Errors
///
/// Returns an error for a malformed `$oid` or `$binary` wrapper.
pub fn from_json(json: Json) -> CodecResult<Value> {
    let value = match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_json)
                .collect::<CodecResult<Vec<_>>>()?,
        ),
        Json::Object(map) => {
            if map.len() == 1 {
                if let Some(Json::String(hex)) = map.get(OID_KEY) {
                    return Ok(Value::ObjectId(ObjectId::parse_str(hex)?));
                }
                if let Some(Json::String(hex)) = map.get(BINARY_KEY) {
                    return from_hex(hex).map(Value::Binary);
                }
            }
            let mut doc = Document::with_capacity(map.len());
            for (key, value) in map {
                doc.insert(key, from_json(value)?);
            }
            Value::Document(doc)
        }
    };
    Ok(value)
}

fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

fn from_hex(hex: &str) -> CodecResult<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(CodecError::json(format!("odd-length binary hex: {hex}")));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CodecError::json(format!("invalid binary hex: {hex}")))
        })
        .collect()
}

impl Document {
    /// Parses a JSON object into a document, preserving field order.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] for invalid JSON and
    /// [`CodecError::NotADocument`] if the top level is not an object.
    pub fn from_json_str(text: &str) -> CodecResult<Self> {
        let json: Json = serde_json::from_str(text)?;
        match from_json(json)? {
            Value::Document(doc) => Ok(doc),
            _ => Err(CodecError::NotADocument),
        }
    }

    /// Renders the document as compact JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if serialization fails.
    pub fn to_json_string(&self) -> CodecResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Renders the document as indented JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if serialization fails.
    pub fn to_json_pretty(&self) -> CodecResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

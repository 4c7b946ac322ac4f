//! Binary document encoder.

use crate::document::Document;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use bytes::{BufMut, BytesMut};

/// Type tags of the binary format.
pub(crate) mod tag {
    pub const DOUBLE: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const DOCUMENT: u8 = 0x03;
    pub const ARRAY: u8 = 0x04;
    pub const BINARY: u8 = 0x05;
    pub const OBJECT_ID: u8 = 0x07;
    pub const BOOL: u8 = 0x08;
    pub const NULL: u8 = 0x0A;
    pub const INT64: u8 = 0x12;
}

/// Encodes a document to bytes.
///
/// The output is canonical: a given field sequence always produces the
/// same bytes.
///
/// # Errors
///
/// Returns an error if a field name contains a NUL byte or the document
/// exceeds `i32::MAX` bytes.
pub fn encode_document(doc: &Document) -> CodecResult<Vec<u8>> {
    let mut encoder = DocumentEncoder::new();
    encoder.encode(doc)?;
    Ok(encoder.into_bytes())
}

/// A reusable document encoder.
pub struct DocumentEncoder {
    buffer: BytesMut,
}

impl DocumentEncoder {
    /// Create a new encoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Create a new encoder with the specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends one encoded document to the buffer.
    ///
    /// # Errors
    ///
    /// See [`encode_document`].
    pub fn encode(&mut self, doc: &Document) -> CodecResult<()> {
        self.write_fields(doc.iter())
    }

    /// Consume this encoder and return the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    fn write_fields<'a, I>(&mut self, fields: I) -> CodecResult<()>
    where
        I: Iterator<Item = (&'a str, &'a Value)>,
    {
        let start = self.buffer.len();
        self.buffer.put_i32_le(0);
        for (key, value) in fields {
            self.write_element(key, value)?;
        }
        self.buffer.put_u8(0);

        let len = self.buffer.len() - start;
        let declared =
            i32::try_from(len).map_err(|_| CodecError::DocumentTooLarge { size: len })?;
        self.buffer[start..start + 4].copy_from_slice(&declared.to_le_bytes());
        Ok(())
    }

    fn write_element(&mut self, key: &str, value: &Value) -> CodecResult<()> {
        let type_tag = match value {
            Value::Null => tag::NULL,
            Value::Bool(_) => tag::BOOL,
            Value::Int(_) => tag::INT64,
            Value::Double(_) => tag::DOUBLE,
            Value::String(_) => tag::STRING,
            Value::Binary(_) => tag::BINARY,
            Value::Document(_) => tag::DOCUMENT,
            Value::Array(_) => tag::ARRAY,
            Value::ObjectId(_) => tag::OBJECT_ID,
        };
        self.buffer.put_u8(type_tag);
        self.write_cstring(key)?;

        match value {
            Value::Null => {}
            Value::Bool(b) => self.buffer.put_u8(u8::from(*b)),
            Value::Int(n) => self.buffer.put_i64_le(*n),
            Value::Double(d) => self.buffer.put_f64_le(*d),
            Value::String(s) => {
                let len = s.len() + 1;
                let declared =
                    i32::try_from(len).map_err(|_| CodecError::DocumentTooLarge { size: len })?;
                self.buffer.put_i32_le(declared);
                self.buffer.put_slice(s.as_bytes());
                self.buffer.put_u8(0);
            }
            Value::Binary(data) => {
                let declared = i32::try_from(data.len())
                    .map_err(|_| CodecError::DocumentTooLarge { size: data.len() })?;
                self.buffer.put_i32_le(declared);
                self.buffer.put_u8(0);
                self.buffer.put_slice(data);
            }
            Value::Document(doc) => self.write_fields(doc.iter())?,
            Value::Array(items) => {
                let keys: Vec<String> = (0..items.len()).map(|i| i.to_string()).collect();
                self.write_fields(keys.iter().map(String::as_str).zip(items.iter()))?;
            }
            Value::ObjectId(oid) => self.buffer.put_slice(&oid.bytes()),
        }
        Ok(())
    }

    fn write_cstring(&mut self, key: &str) -> CodecResult<()> {
        if key.as_bytes().contains(&0) {
            return Err(CodecError::InvalidKey {
                key: key.to_string(),
            });
        }
        self.buffer.put_slice(key.as_bytes());
        self.buffer.put_u8(0);
        Ok(())
    }
}

impl Default for DocumentEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid::ObjectId;

    #[test]
    fn empty_document_is_five_bytes() {
        let bytes = encode_document(&Document::new()).unwrap();
        assert_eq!(bytes, vec![5, 0, 0, 0, 0]);
    }

    #[test]
    fn encode_int_field() {
        let bytes = encode_document(&Document::new().with("a", 1)).unwrap();
        assert_eq!(
            bytes,
            vec![16, 0, 0, 0, 0x12, b'a', 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn encode_string_field() {
        let bytes = encode_document(&Document::new().with("s", "hi")).unwrap();
        assert_eq!(
            bytes,
            vec![15, 0, 0, 0, 0x02, b's', 0, 3, 0, 0, 0, b'h', b'i', 0, 0]
        );
    }

    #[test]
    fn arrays_use_index_keys() {
        let doc = Document::new().with("x", Value::Array(vec![Value::Bool(true)]));
        let bytes = encode_document(&doc).unwrap();
        // outer header, array tag, "x", inner header, bool tag, "0", true, inner end, outer end
        assert_eq!(
            bytes,
            vec![17, 0, 0, 0, 0x04, b'x', 0, 9, 0, 0, 0, 0x08, b'0', 0, 1, 0, 0]
        );
    }

    #[test]
    fn object_id_payload_is_raw_bytes() {
        let oid = ObjectId::from_bytes([7; 12]);
        let bytes = encode_document(&Document::new().with("_id", oid)).unwrap();
        assert_eq!(bytes.len(), 4 + 1 + 4 + 12 + 1);
        assert_eq!(&bytes[9..21], &[7; 12]);
    }

    #[test]
    fn encoding_is_deterministic() {
        let doc = Document::new().with("b", 2.5).with("a", "x");
        assert_eq!(encode_document(&doc).unwrap(), encode_document(&doc).unwrap());
    }

    #[test]
    fn nul_in_key_rejected() {
        let doc = Document::new().with("a\0b", 1);
        assert!(matches!(
            encode_document(&doc),
            Err(CodecError::InvalidKey { .. })
        ));
    }
}

//! Binary document decoder.

use crate::document::Document;
use crate::encoder::tag;
use crate::error::{CodecError, CodecResult};
use crate::oid::ObjectId;
use crate::value::Value;

/// Maximum nesting of documents and arrays accepted by the decoder.
pub const MAX_NESTING: usize = 100;

/// Decodes a complete document.
///
/// The declared length must equal `bytes.len()` exactly.
///
/// # Errors
///
/// Returns [`CodecError::LengthMismatch`] if a declared length disagrees with
/// the data, [`CodecError::UnknownType`] for an unrecognized tag, and other
/// variants for truncated or invalid input.
pub fn decode_document(bytes: &[u8]) -> CodecResult<Document> {
    let mut decoder = DocumentDecoder::new(bytes);
    let doc = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::LengthMismatch {
            declared: decoder.pos,
            actual: bytes.len(),
        });
    }
    Ok(doc)
}

/// A streaming decoder over a byte slice.
pub struct DocumentDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> DocumentDecoder<'a> {
    /// Create a new decoder for the given bytes.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Decodes the next document.
    ///
    /// # Errors
    ///
    /// See [`decode_document`].
    pub fn decode(&mut self) -> CodecResult<Document> {
        let fields = self.read_fields()?;
        Ok(fields.into_iter().collect())
    }

    /// Check if all bytes have been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn read_len(&mut self) -> CodecResult<usize> {
        let raw = i32::from_le_bytes(self.read_array()?);
        usize::try_from(raw).map_err(|_| CodecError::LengthMismatch {
            declared: 0,
            actual: self.data.len(),
        })
    }

    fn read_cstring(&mut self) -> CodecResult<String> {
        let rest = &self.data[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::MissingTerminator {
                offset: self.data.len(),
            })?;
        let text = std::str::from_utf8(&rest[..nul]).map_err(|_| CodecError::InvalidUtf8)?;
        self.pos += nul + 1;
        Ok(text.to_string())
    }

    fn read_fields(&mut self) -> CodecResult<Vec<(String, Value)>> {
        if self.depth >= MAX_NESTING {
            return Err(CodecError::NestingTooDeep { max: MAX_NESTING });
        }
        let start = self.pos;
        let declared = self.read_len()?;
        let available = self.data.len() - start;
        if declared < 5 || declared > available {
            return Err(CodecError::LengthMismatch {
                declared,
                actual: available,
            });
        }
        let end = start + declared;

        self.depth += 1;
        let mut fields = Vec::new();
        loop {
            if self.pos >= end {
                return Err(CodecError::MissingTerminator { offset: end - 1 });
            }
            let type_tag = self.read_byte()?;
            if type_tag == 0 {
                break;
            }
            let key = self.read_cstring()?;
            let value = self.read_value(type_tag, &key)?;
            fields.push((key, value));
        }
        self.depth -= 1;

        if self.pos != end {
            return Err(CodecError::LengthMismatch {
                declared,
                actual: self.pos - start,
            });
        }
        Ok(fields)
    }

    fn read_value(&mut self, type_tag: u8, key: &str) -> CodecResult<Value> {
        let value = match type_tag {
            tag::NULL => Value::Null,
            tag::BOOL => Value::Bool(self.read_byte()? != 0),
            tag::INT64 => Value::Int(i64::from_le_bytes(self.read_array()?)),
            tag::DOUBLE => Value::Double(f64::from_le_bytes(self.read_array()?)),
            tag::STRING => {
                let len = self.read_len()?;
                if len == 0 {
                    return Err(CodecError::MissingTerminator { offset: self.pos });
                }
                let bytes = self.read_bytes(len)?;
                let (text, nul) = bytes.split_at(len - 1);
                if nul != [0] {
                    return Err(CodecError::MissingTerminator {
                        offset: self.pos - 1,
                    });
                }
                let text = std::str::from_utf8(text).map_err(|_| CodecError::InvalidUtf8)?;
                Value::String(text.to_string())
            }
            tag::BINARY => {
                let len = self.read_len()?;
                let _subtype = self.read_byte()?;
                Value::Binary(self.read_bytes(len)?.to_vec())
            }
            tag::OBJECT_ID => Value::ObjectId(ObjectId::from_bytes(self.read_array()?)),
            tag::DOCUMENT => Value::Document(self.read_fields()?.into_iter().collect()),
            tag::ARRAY => Value::Array(
                self.read_fields()?
                    .into_iter()
                    .map(|(_, value)| value)
                    .collect(),
            ),
            other => {
                return Err(CodecError::UnknownType {
                    tag: other,
                    key: key.to_string(),
                })
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_document;

    fn sample() -> Document {
        Document::new()
            .with("_id", ObjectId::new())
            .with("name", "Bruce")
            .with("age", 58)
            .with("ratio", 0.25)
            .with("alive", true)
            .with("nothing", Value::Null)
            .with("blob", vec![1u8, 2, 3])
            .with(
                "nested",
                Document::new().with(
                    "list",
                    Value::Array(vec![Value::Int(1), Value::from("two")]),
                ),
            )
    }

    #[test]
    fn decode_restores_every_type() {
        let doc = sample();
        let bytes = encode_document(&doc).unwrap();
        assert_eq!(decode_document(&bytes).unwrap(), doc);
    }

    #[test]
    fn declared_length_longer_than_data_fails() {
        let mut bytes = encode_document(&sample()).unwrap();
        bytes.pop();
        assert!(matches!(
            decode_document(&bytes),
            Err(CodecError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn trailing_bytes_fail() {
        let mut bytes = encode_document(&sample()).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_document(&bytes),
            Err(CodecError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn shrunken_declared_length_fails() {
        let mut bytes = encode_document(&Document::new().with("a", 1)).unwrap();
        bytes[0] -= 1;
        assert!(decode_document(&bytes).is_err());
    }

    #[test]
    fn unknown_tag_fails() {
        let mut bytes = encode_document(&Document::new().with("a", 1)).unwrap();
        bytes[4] = 0x7f;
        assert_eq!(
            decode_document(&bytes),
            Err(CodecError::UnknownType {
                tag: 0x7f,
                key: "a".to_string()
            })
        );
    }

    #[test]
    fn truncated_input_fails() {
        assert!(decode_document(&[]).is_err());
        assert!(decode_document(&[5, 0, 0]).is_err());
    }

    #[test]
    fn excessive_nesting_rejected() {
        let mut doc = Document::new().with("leaf", 1);
        for _ in 0..MAX_NESTING + 1 {
            doc = Document::new().with("n", doc);
        }
        let bytes = encode_document(&doc).unwrap();
        assert!(matches!(
            decode_document(&bytes),
            Err(CodecError::NestingTooDeep { .. })
        ));
    }
}

//! Index persistence.
//!
//! Each index is saved to its own file so it need not be rebuilt at open:
//!
//! ```text
//! | magic "DDIX" | version u8 | kind u8 | path_len u16 | path |
//! | data_size u64 | key_count u32 | key* | crc32 u32 |
//!
//! key = tag u8 (0 number, 1 text) | f64 or (len u32 | utf8) |
//!       oid_count u32 | oid [12]*
//! ```
//!
//! `data_size` is the data log size the index reflects. A file whose size
//! does not match the log, or that fails to decode, is discarded and the
//! index rebuilt. Index files are an optimization; the data log is the
//! source of truth.

use crate::collection::record::compute_crc32;
use crate::error::{CoreError, CoreResult};
use crate::index::field::FieldIndex;
use crate::index::key::{IndexKey, IndexKind};
use docudb_codec::ObjectId;
use std::collections::{BTreeMap, BTreeSet};

const INDEX_MAGIC: [u8; 4] = *b"DDIX";
const INDEX_VERSION: u8 = 1;

const KEY_NUMBER: u8 = 0;
const KEY_TEXT: u8 = 1;

/// Serializes `index` as a snapshot of a data log of `data_size` bytes.
pub(crate) fn encode_index(index: &FieldIndex, data_size: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&INDEX_MAGIC);
    buf.push(INDEX_VERSION);
    buf.push(index.kind().to_byte());

    let path = index.path().as_bytes();
    buf.extend_from_slice(&(path.len() as u16).to_le_bytes());
    buf.extend_from_slice(path);
    buf.extend_from_slice(&data_size.to_le_bytes());

    let entries = index.entries();
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (key, oids) in entries {
        match key {
            IndexKey::Number(n) => {
                buf.push(KEY_NUMBER);
                buf.extend_from_slice(&n.get().to_le_bytes());
            }
            IndexKey::Text(text) => {
                buf.push(KEY_TEXT);
                buf.extend_from_slice(&(text.len() as u32).to_le_bytes());
                buf.extend_from_slice(text.as_bytes());
            }
        }
        buf.extend_from_slice(&(oids.len() as u32).to_le_bytes());
        for oid in oids {
            buf.extend_from_slice(&oid.bytes());
        }
    }

    let crc = compute_crc32(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Deserializes an index file, returning the index and the data log size
/// it reflects.
pub(crate) fn decode_index(data: &[u8]) -> CoreResult<(FieldIndex, u64)> {
    if data.len() < INDEX_MAGIC.len() + 4 {
        return Err(CoreError::invalid_format("index file too small"));
    }
    let (body, crc_bytes) = data.split_at(data.len() - 4);
    let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let computed = compute_crc32(body);
    if stored != computed {
        return Err(CoreError::ChecksumMismatch {
            expected: stored,
            actual: computed,
        });
    }

    let mut reader = Reader { data: body, pos: 0 };
    if reader.take(4)? != INDEX_MAGIC {
        return Err(CoreError::invalid_format("invalid index magic"));
    }
    let version = reader.u8()?;
    if version != INDEX_VERSION {
        return Err(CoreError::invalid_format(format!(
            "unsupported index version: {version}"
        )));
    }
    let kind = IndexKind::from_byte(reader.u8()?)
        .ok_or_else(|| CoreError::invalid_format("unknown index kind"))?;
    let path_len = reader.u16()? as usize;
    let path = reader.string(path_len)?;
    let data_size = reader.u64()?;

    let key_count = reader.u32()?;
    let mut entries = BTreeMap::new();
    for _ in 0..key_count {
        let key = match reader.u8()? {
            KEY_NUMBER => IndexKey::number(f64::from_le_bytes(reader.array()?))
                .ok_or_else(|| CoreError::invalid_format("non-finite number key"))?,
            KEY_TEXT => {
                let len = reader.u32()? as usize;
                IndexKey::Text(reader.string(len)?)
            }
            tag => {
                return Err(CoreError::invalid_format(format!(
                    "unknown index key tag: {tag}"
                )))
            }
        };
        let oid_count = reader.u32()?;
        let mut oids = BTreeSet::new();
        for _ in 0..oid_count {
            oids.insert(ObjectId::from_bytes(reader.array()?));
        }
        entries.insert(key, oids);
    }
    if reader.pos != body.len() {
        return Err(CoreError::invalid_format("trailing bytes in index file"));
    }

    Ok((FieldIndex::from_parts(path, kind, entries), data_size))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(CoreError::invalid_format("index file truncated"));
        }
        let data = self.data;
        let slice = &data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> CoreResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> CoreResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn string(&mut self, len: usize) -> CoreResult<String> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CoreError::invalid_format("index file holds invalid UTF-8"))
    }
}

/// File name of an index: `<collection>.idx.<kind>.<path>`.
pub(crate) fn index_file_name(collection: &str, path: &str, kind: IndexKind) -> String {
    format!("{collection}.idx.{}.{path}", kind.name())
}

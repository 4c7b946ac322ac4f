//! Data log record format.
//!
//! ```text
//! | len u32 | flags u8 | seq u64 | oid [12] | payload | crc32 u32 |
//! ```
//!
//! `len` covers the whole record including itself and the checksum. The CRC
//! is computed over every byte before it. Tombstones carry an empty payload.

use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;
use docudb_codec::ObjectId;

/// Flags for data log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags(u8);

impl RecordFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Record removes the document.
    pub const TOMBSTONE: Self = Self(0x01);
    /// Record belongs to a transaction batch.
    pub const BATCH: Self = Self(0x02);
    /// Last record of a transaction batch.
    pub const BATCH_END: Self = Self(0x04);

    /// Creates flags from a raw byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// Returns the raw byte value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns these flags with `other` added.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// One record of a collection data log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Record flags.
    pub flags: RecordFlags,
    /// Write order.
    pub sequence: SequenceNumber,
    /// Document identifier.
    pub oid: ObjectId,
    /// Encoded document, empty for tombstones.
    pub payload: Vec<u8>,
}

/// Outcome of decoding at some offset of a log.
#[derive(Debug)]
pub enum Decoded {
    /// A complete record and the number of bytes it occupies.
    Record(LogRecord, usize),
    /// The remaining bytes do not hold a complete record.
    Torn,
}

impl LogRecord {
    /// Header size: len (4) + flags (1) + sequence (8) + oid (12) = 25
    pub const HEADER_SIZE: usize = 25;
    /// CRC size.
    pub const CRC_SIZE: usize = 4;

    /// Creates a record that stores a document.
    #[must_use]
    pub fn put(oid: ObjectId, payload: Vec<u8>, sequence: SequenceNumber) -> Self {
        Self {
            flags: RecordFlags::NONE,
            sequence,
            oid,
            payload,
        }
    }

    /// Creates a tombstone record.
    #[must_use]
    pub fn tombstone(oid: ObjectId, sequence: SequenceNumber) -> Self {
        Self {
            flags: RecordFlags::TOMBSTONE,
            sequence,
            oid,
            payload: Vec::new(),
        }
    }

    /// Whether this record removes its document.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.flags.contains(RecordFlags::TOMBSTONE)
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len() + Self::CRC_SIZE
    }

    /// Appends the encoded record to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        let record_len = u32::try_from(self.encoded_size()).unwrap_or(u32::MAX);
        buf.extend_from_slice(&record_len.to_le_bytes());
        buf.push(self.flags.as_byte());
        buf.extend_from_slice(&self.sequence.as_u64().to_le_bytes());
        buf.extend_from_slice(&self.oid.bytes());
        buf.extend_from_slice(&self.payload);
        let crc = compute_crc32(&buf[start..]);
        buf.extend_from_slice(&crc.to_le_bytes());
    }

    /// Encodes the record to bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        self.encode_into(&mut buf);
        buf
    }

    /// Decodes the record at the start of `data`.
    ///
    /// A record cut short by the end of `data` is reported as
    /// [`Decoded::Torn`]; a complete record with a bad checksum is an error.
    pub fn decode(data: &[u8]) -> CoreResult<Decoded> {
        if data.len() < Self::HEADER_SIZE + Self::CRC_SIZE {
            return Ok(Decoded::Torn);
        }
        let record_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_len < Self::HEADER_SIZE + Self::CRC_SIZE {
            return Err(CoreError::invalid_format(format!(
                "record length {record_len} is shorter than the record header"
            )));
        }
        if data.len() < record_len {
            return Ok(Decoded::Torn);
        }

        let stored_crc = u32::from_le_bytes([
            data[record_len - 4],
            data[record_len - 3],
            data[record_len - 2],
            data[record_len - 1],
        ]);
        let computed_crc = compute_crc32(&data[..record_len - 4]);
        if stored_crc != computed_crc {
            return Err(CoreError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let flags = RecordFlags::from_byte(data[4]);
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&data[5..13]);
        let mut oid = [0u8; 12];
        oid.copy_from_slice(&data[13..25]);
        let payload = data[Self::HEADER_SIZE..record_len - Self::CRC_SIZE].to_vec();

        Ok(Decoded::Record(
            Self {
                flags,
                sequence: SequenceNumber::new(u64::from_le_bytes(seq)),
                oid: ObjectId::from_bytes(oid),
                payload,
            },
            record_len,
        ))
    }
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding, decoding or editing documents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The declared length of a document does not match its actual length.
    #[error("length mismatch: declared {declared} bytes, found {actual}")]
    LengthMismatch {
        /// Length read from the length prefix.
        declared: usize,
        /// Length actually available or consumed.
        actual: usize,
    },

    /// A field carries a type tag this codec does not know.
    #[error("unknown type tag 0x{tag:02x} for field '{key}'")]
    UnknownType {
        /// The unrecognized tag byte.
        tag: u8,
        /// Field name the tag belongs to.
        key: String,
    },

    /// Input ended in the middle of a value.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A string or key is not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// A string or document is not terminated by a NUL byte.
    #[error("missing terminator at offset {offset}")]
    MissingTerminator {
        /// Offset where the terminator was expected.
        offset: usize,
    },

    /// A field name cannot be encoded.
    #[error("invalid field name: {key:?}")]
    InvalidKey {
        /// The rejected field name.
        key: String,
    },

    /// A document exceeds the maximum encodable size.
    #[error("document too large: {size} bytes")]
    DocumentTooLarge {
        /// Size of the offending document.
        size: usize,
    },

    /// Documents are nested deeper than the codec accepts.
    #[error("document nesting exceeds {max} levels")]
    NestingTooDeep {
        /// Maximum depth.
        max: usize,
    },

    /// A string is not a canonical object identifier.
    #[error("invalid object id: {input:?}")]
    InvalidObjectId {
        /// The rejected input.
        input: String,
    },

    /// A field path runs through a value that cannot hold children.
    #[error("field path '{path}' conflicts with an existing value")]
    PathConflict {
        /// The offending path.
        path: String,
    },

    /// JSON text could not be parsed or produced.
    #[error("JSON error: {message}")]
    Json {
        /// Description of the error.
        message: String,
    },

    /// JSON text parsed to something other than an object.
    #[error("expected a JSON object at top level")]
    NotADocument,
}

impl CodecError {
    /// Creates a JSON error.
    pub fn json(message: impl Into<String>) -> Self {
        Self::Json {
            message: message.into(),
        }
    }

    /// Creates an invalid object id error.
    pub fn invalid_object_id(input: impl Into<String>) -> Self {
        Self::InvalidObjectId {
            input: input.into(),
        }
    }

    /// Creates a path conflict error.
    pub fn path_conflict(path: impl Into<String>) -> Self {
        Self::PathConflict { path: path.into() }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::json(err.to_string())
    }
}

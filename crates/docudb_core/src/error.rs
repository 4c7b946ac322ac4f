//! Error types for DocuDB core.

use docudb_codec::{CodecError, ObjectId};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors returned by the document engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Collection name violates the naming rule.
    #[error("invalid collection name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Collection does not exist (or its handle was invalidated by a drop).
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// Document does not exist.
    #[error("document not found: {oid} in collection {collection}")]
    DocumentNotFound {
        /// Collection searched.
        collection: String,
        /// Missing identifier.
        oid: ObjectId,
    },

    /// Insert with an identifier that is already present.
    #[error("duplicate key: {oid} already exists in collection {collection}")]
    DuplicateKey {
        /// Collection written to.
        collection: String,
        /// Colliding identifier.
        oid: ObjectId,
    },

    /// Bytes are not a well-formed document.
    #[error("malformed document: {0}")]
    MalformedDocument(#[source] CodecError),

    /// A value has the wrong type for the requested operation.
    #[error("type mismatch: {message}")]
    TypeMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// Malformed query syntax.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// Unrecognized or misplaced `$`-prefixed control key.
    #[error("invalid query control key: {key}")]
    InvalidQueryControl {
        /// The offending key.
        key: String,
    },

    /// An operator that needs an array operand received something else.
    #[error("operator {operator} requires an array operand")]
    OperandNotArray {
        /// The operator.
        operator: String,
    },

    /// More than one `$elemMatch` for the same array field.
    #[error("only one $elemMatch is allowed per array field: {field}")]
    TooManyElemMatch {
        /// The array field path.
        field: String,
    },

    /// A `$fields` hint mixes inclusion and exclusion.
    #[error("$fields hint cannot mix include and exclude fields")]
    MixedProjection,

    /// Index declaration or rebuild failure.
    #[error("index error on '{field}': {message}")]
    IndexError {
        /// Field path of the index.
        field: String,
        /// Description of the failure.
        message: String,
    },

    /// `begin` while a transaction is already active.
    #[error("transaction already active on collection {collection}")]
    TransactionAlreadyActive {
        /// The collection.
        collection: String,
    },

    /// `commit`/`abort` with no active transaction.
    #[error("no active transaction on collection {collection}")]
    NoActiveTransaction {
        /// The collection.
        collection: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] docudb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the database lock.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// Mutation on a database opened read-only.
    #[error("database is opened read-only")]
    ReadOnly,

    /// Invalid on-disk format.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Checksum mismatch in a data log record.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// The database already holds the maximum number of collections.
    #[error("too many collections: limit is {limit}")]
    TooManyCollections {
        /// Configured limit.
        limit: usize,
    },
}

impl CoreError {
    /// Creates a type mismatch error.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates an invalid control key error.
    pub fn invalid_control(key: impl Into<String>) -> Self {
        Self::InvalidQueryControl { key: key.into() }
    }

    /// Creates an operand-not-array error.
    pub fn operand_not_array(operator: impl Into<String>) -> Self {
        Self::OperandNotArray {
            operator: operator.into(),
        }
    }

    /// Creates an index error.
    pub fn index_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IndexError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Whether this is either half of the `NotFound` category.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CollectionNotFound { .. } | Self::DocumentNotFound { .. }
        )
    }
}

impl From<CodecError> for CoreError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::PathConflict { path } => {
                Self::type_mismatch(format!("field path '{path}' runs through a non-container value"))
            }
            other => Self::MalformedDocument(other),
        }
    }
}

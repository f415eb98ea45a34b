//! Error types for the comb-db crate
//!
//! Index and chunk-store failures are folded into [`DbError`] so callers
//! see one taxonomy: a missing key from the B+tree and a missing row are
//! both [`DbError::KeyNotFound`], and any chunk I/O failure is
//! [`DbError::ChunkStoreUnavailable`].

use comb_index::{IndexError, KeyType};
use comb_primitives::{ChunkAddress, StoreError};
use thiserror::Error;

/// Result type for database operations
pub type Result<T> = std::result::Result<T, DbError>;

/// Errors raised by tables, the key-value layer and the registry
#[derive(Error, Debug)]
pub enum DbError {
    /// The key is not present in the table
    #[error("Key not found")]
    KeyNotFound,

    /// An insert hit an existing primary key
    #[error("Duplicate key")]
    DuplicateKey,

    /// A value does not fit in a 32-byte key slot
    #[error("Key size exceeded: {size} bytes (max: {max})")]
    KeySizeExceeded {
        /// Length of the rejected key
        size: usize,
        /// Length of a key slot
        max: usize,
    },

    /// A row payload does not fit in one chunk
    #[error("Value size exceeded: {size} bytes (max: {max})")]
    ValueSizeExceeded {
        /// Length of the payload
        size: usize,
        /// Payload capacity of a chunk
        max: usize,
    },

    /// A row payload is shorter than the configured minimum
    #[error("Value too small: {size} bytes (min: {min})")]
    ValueTooSmall {
        /// Length of the payload
        size: usize,
        /// Configured minimum
        min: usize,
    },

    /// The table has no column of that name
    #[error("No such column: {0}")]
    NoSuchColumn(String),

    /// A row to be written lacks its primary key
    #[error("Row is missing primary key column {0}")]
    MissingPrimaryKey(String),

    /// No descriptor is registered for the table
    #[error("No such table: {0}")]
    NoSuchTable(String),

    /// A table of that name already exists for the owner
    #[error("Table already exists: {0}")]
    TableExists(String),

    /// A buffered-only operation was called on an unbuffered table
    #[error("Buffer not started")]
    BufferNotStarted,

    /// The chunk store failed
    #[error("Chunk store unavailable: {0}")]
    ChunkStoreUnavailable(#[source] StoreError),

    /// A descriptor chunk could not be parsed or does not belong to the table
    #[error("Malformed table descriptor: {0}")]
    MalformedDescriptor(String),

    /// A row chunk could not be parsed or does not belong to the key
    #[error("Malformed record {address}: {message}")]
    MalformedRecord {
        /// Address the chunk was read from
        address: ChunkAddress,
        /// What was wrong with it
        message: String,
    },

    /// A row value does not match the declared column type
    #[error("Type mismatch in column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Column the value was given for
        column: String,
        /// Declared column type
        expected: KeyType,
        /// Variant of the supplied value
        found: &'static str,
    },

    /// NaN and the infinities have no JSON encoding
    #[error("Non-finite float for column {0}")]
    NonFiniteFloat(String),

    /// A table definition is not acceptable
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// The column cannot be scanned in key order
    #[error("Scan not supported on column {column}: {reason}")]
    UnsupportedScan {
        /// Requested column
        column: String,
        /// Why the scan was refused
        reason: &'static str,
    },

    /// A payload could not be encrypted or decrypted
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// A row payload is not valid JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded or is out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Any other index failure
    #[error(transparent)]
    Index(IndexError),
}

impl DbError {
    /// Creates a [`DbError::TypeMismatch`] error
    pub fn type_mismatch<S: Into<String>>(column: S, expected: KeyType, found: &'static str) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected,
            found,
        }
    }

    /// Creates a [`DbError::MalformedRecord`] error
    pub fn malformed_record<S: Into<String>>(address: ChunkAddress, message: S) -> Self {
        Self::MalformedRecord {
            address,
            message: message.into(),
        }
    }

    /// Creates a [`DbError::InvalidSchema`] error
    pub fn invalid_schema<S: Into<String>>(message: S) -> Self {
        Self::InvalidSchema(message.into())
    }

    /// Creates a [`DbError::Cipher`] error
    pub fn cipher<S: Into<String>>(message: S) -> Self {
        Self::Cipher(message.into())
    }
}

impl From<StoreError> for DbError {
    fn from(err: StoreError) -> Self {
        Self::ChunkStoreUnavailable(err)
    }
}

impl From<IndexError> for DbError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::KeyNotFound => Self::KeyNotFound,
            IndexError::DuplicateKey => Self::DuplicateKey,
            IndexError::KeySizeExceeded { size, max } => Self::KeySizeExceeded { size, max },
            IndexError::BufferNotStarted => Self::BufferNotStarted,
            IndexError::Store(err) => Self::ChunkStoreUnavailable(err),
            other => Self::Index(other),
        }
    }
}

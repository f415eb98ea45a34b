//! Error types for the comb-primitives crate
//!
//! Every chunk-store implementation reports failures through [`StoreError`].
//! Higher layers wrap it in their own error enums rather than matching on
//! backend-specific types.
//!
//! ## Example Usage
//!
//! ```
//! use comb_primitives::{ChunkAddress, StoreError};
//!
//! fn describe(err: &StoreError) -> &'static str {
//!     match err {
//!         StoreError::ChunkNotFound(_) => "missing",
//!         StoreError::StoreFailed(_) => "write failed",
//!         _ => "other",
//!     }
//! }
//!
//! assert_eq!(describe(&StoreError::ChunkNotFound(ChunkAddress::zero())), "missing");
//! ```

use thiserror::Error;

use crate::ChunkAddress;

/// Result type for operations in the primitives crate
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by chunks and chunk stores
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// No chunk is stored under the requested address
    #[error("Chunk not found: {0}")]
    ChunkNotFound(ChunkAddress),

    /// The backend refused or failed to persist a chunk
    #[error("Chunk store failed: {0}")]
    StoreFailed(String),

    /// The backend could not be reached at all
    #[error("Chunk store unavailable: {0}")]
    Unavailable(String),

    /// Chunk data does not fit the fixed chunk size
    #[error("Invalid chunk size: {message} (max: {max}, got: {actual})")]
    InvalidChunkSize {
        /// What was being sized
        message: &'static str,
        /// Largest accepted size
        max: usize,
        /// Size that was supplied
        actual: usize,
    },

    /// Array conversion errors
    #[error("Array conversion error: {0}")]
    ArrayConversion(#[from] std::array::TryFromSliceError),
}

impl StoreError {
    /// Creates an [`StoreError::InvalidChunkSize`] error
    pub const fn invalid_size(message: &'static str, max: usize, actual: usize) -> Self {
        Self::InvalidChunkSize {
            message,
            max,
            actual,
        }
    }

    /// Creates a [`StoreError::StoreFailed`] error
    pub fn store_failed<S: Into<String>>(msg: S) -> Self {
        Self::StoreFailed(msg.into())
    }

    /// Creates a [`StoreError::Unavailable`] error
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Returns true when the error means the chunk simply does not exist
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ChunkNotFound(_))
    }
}

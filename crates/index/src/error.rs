//! Error types for the comb-index crate

use comb_primitives::{ChunkAddress, StoreError};
use thiserror::Error;

/// Result type for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors raised by the B+tree and hash-trie indexes
#[derive(Error, Debug, Clone)]
pub enum IndexError {
    /// The key is not present in the index
    #[error("Key not found")]
    KeyNotFound,

    /// `insert` was called with a key that is already present
    #[error("Duplicate key")]
    DuplicateKey,

    /// A key does not fit in a key slot
    #[error("Key size exceeded: {size} bytes (max: {max})")]
    KeySizeExceeded {
        /// Length of the rejected key
        size: usize,
        /// Length of a key slot
        max: usize,
    },

    /// A buffered-only operation was called on an unbuffered index
    #[error("Buffer not started")]
    BufferNotStarted,

    /// A chunk could not be decoded as an index node
    #[error("Malformed node {address}: {message}")]
    MalformedNode {
        /// Address the chunk was read from
        address: ChunkAddress,
        /// What was wrong with it
        message: String,
    },

    /// Two distinct keys share every bin of their hash
    #[error("Hash trie depth exceeded at level {0}")]
    TrieDepthExceeded(usize),

    /// A structural check of an index failed
    #[error("Index invariant violated: {0}")]
    InvariantViolated(String),

    /// Fanout parameters do not describe a node that fits in a chunk
    #[error("Invalid fanout: leaf {leaf}, branch {branch}")]
    InvalidFanout {
        /// Leaf fanout (`kd`)
        leaf: usize,
        /// Branch fanout (`kx`)
        branch: usize,
    },

    /// A stored node holds more entries than the tree's fanout allows
    #[error("Node {address} holds {entries} entries (max: {max})")]
    FanoutExceeded {
        /// Address the node was read from
        address: ChunkAddress,
        /// Entries found in the node
        entries: usize,
        /// Most entries the fanout allows
        max: usize,
    },

    /// The chunk store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IndexError {
    /// Creates an [`IndexError::KeySizeExceeded`] error
    pub const fn key_size(size: usize, max: usize) -> Self {
        Self::KeySizeExceeded { size, max }
    }

    /// Creates an [`IndexError::MalformedNode`] error
    pub fn malformed<S: Into<String>>(address: ChunkAddress, message: S) -> Self {
        Self::MalformedNode {
            address,
            message: message.into(),
        }
    }
}

//! Capabilities shared by the index kinds.
//!
//! Both the B+tree and the hash trie implement [`Index`]. Only the B+tree
//! keeps keys in comparator order and therefore implements
//! [`OrderedIndex`]; callers that need range scans must ask for that trait
//! rather than assume it.

use comb_primitives::ChunkAddress;

use crate::{IndexKey, Result};

/// Whether a `put` created a new entry or replaced an existing value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The key was not present before
    Inserted,
    /// The key existed and its value was overwritten
    Updated,
}

/// Key to content-address mapping persisted as chunks.
///
/// Reads take `&mut self` because nodes are loaded from the chunk store on
/// first access and cached in the index.
pub trait Index {
    /// Looks up `key`, returning its value if present
    fn get(&mut self, key: &IndexKey) -> Result<Option<ChunkAddress>>;

    /// Inserts or overwrites `key`
    fn put(&mut self, key: &IndexKey, value: ChunkAddress) -> Result<PutOutcome>;

    /// Inserts `key`, failing with [`crate::IndexError::DuplicateKey`] if present
    fn insert(&mut self, key: &IndexKey, value: ChunkAddress) -> Result<()>;

    /// Removes `key`, returning whether it was present
    fn delete(&mut self, key: &IndexKey) -> Result<bool>;

    /// Suspends persistence; mutations stay in memory until a flush
    fn start_buffer(&mut self);

    /// Persists every dirty node, ends buffering and returns the root hash
    ///
    /// Calling it again without an intervening mutation returns the same hash.
    fn flush_buffer(&mut self) -> Result<ChunkAddress>;

    /// Drops all unflushed changes and reopens at the last persisted root
    ///
    /// Fails with [`crate::IndexError::BufferNotStarted`] outside a buffer.
    fn discard_buffer(&mut self) -> Result<()>;

    /// Whether mutations are currently buffered
    fn is_buffered(&self) -> bool;

    /// Root hash as of the last flush; zero for an empty index
    fn root_hash(&self) -> ChunkAddress;
}

/// Forward and backward traversal over an index.
///
/// The order is the one the producing index defines: key order for an
/// [`OrderedIndex`], bin order for the hash trie. Once a cursor reports the
/// end of the sequence it keeps doing so.
pub trait IndexCursor {
    /// Returns the entry under the cursor and moves forward
    fn next(&mut self) -> Result<Option<(IndexKey, ChunkAddress)>>;

    /// Returns the entry under the cursor and moves backward
    fn prev(&mut self) -> Result<Option<(IndexKey, ChunkAddress)>>;
}

/// An index whose traversal order is its key order
pub trait OrderedIndex: Index {
    /// Cursor type borrowing the index
    type Cursor<'a>: IndexCursor
    where
        Self: 'a;

    /// Positions a cursor at the first key not less than `key`
    ///
    /// The flag reports whether `key` itself is present.
    fn seek(&mut self, key: &IndexKey) -> Result<(Self::Cursor<'_>, bool)>;

    /// Positions a cursor at the smallest key
    fn seek_first(&mut self) -> Result<Self::Cursor<'_>>;

    /// Positions a cursor at the largest key
    fn seek_last(&mut self) -> Result<Self::Cursor<'_>>;
}

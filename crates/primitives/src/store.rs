//! Chunk storage traits and the in-memory store.
//!
//! [`ChunkStore`] is the only interface the index and table layers use to
//! persist data. It is deliberately blocking: a lookup in a tree may fan out
//! to several retrievals, one per level that is not yet cached in memory.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::trace;

use crate::{Chunk, ChunkAddress, StoreError, error::Result};

/// A content-addressed chunk store.
///
/// Implementations may keep chunks in memory, on disk, or fetch them from
/// remote peers. Storing the same bytes twice yields the same address; there
/// is no update in place.
pub trait ChunkStore {
    /// Retrieves the chunk stored under `address`.
    ///
    /// Returns [`StoreError::ChunkNotFound`] if nothing is stored there.
    fn retrieve(&self, address: &ChunkAddress) -> Result<Chunk>;

    /// Stores a chunk and returns its content address.
    fn store(&self, chunk: Chunk) -> Result<ChunkAddress>;
}

/// Extension methods for [`ChunkStore`].
pub trait ChunkStoreExt: ChunkStore {
    /// Pads `data` into a chunk and stores it.
    fn store_bytes(&self, data: &[u8]) -> Result<ChunkAddress> {
        self.store(Chunk::new(Bytes::copy_from_slice(data))?)
    }

    /// Retrieves a chunk, mapping a missing chunk to `None`.
    fn try_retrieve(&self, address: &ChunkAddress) -> Result<Option<Chunk>> {
        match self.retrieve(address) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(StoreError::ChunkNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// Blanket implementation
impl<T: ChunkStore + ?Sized> ChunkStoreExt for T {}

impl<T: ChunkStore + ?Sized> ChunkStore for &T {
    fn retrieve(&self, address: &ChunkAddress) -> Result<Chunk> {
        (**self).retrieve(address)
    }

    fn store(&self, chunk: Chunk) -> Result<ChunkAddress> {
        (**self).store(chunk)
    }
}

impl<T: ChunkStore + ?Sized> ChunkStore for Arc<T> {
    fn retrieve(&self, address: &ChunkAddress) -> Result<Chunk> {
        (**self).retrieve(address)
    }

    fn store(&self, chunk: Chunk) -> Result<ChunkAddress> {
        (**self).store(chunk)
    }
}

/// An in-memory chunk store.
///
/// Clones share the same underlying map, so a store handed to several
/// indexes behaves like one backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryChunkStore {
    chunks: Arc<RwLock<HashMap<ChunkAddress, Bytes>>>,
}

impl MemoryChunkStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct chunks held
    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    /// Returns true if no chunk has been stored
    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Returns true if a chunk is stored under `address`
    pub fn contains(&self, address: &ChunkAddress) -> bool {
        self.chunks.read().contains_key(address)
    }
}

impl ChunkStore for MemoryChunkStore {
    fn retrieve(&self, address: &ChunkAddress) -> Result<Chunk> {
        let data = self
            .chunks
            .read()
            .get(address)
            .cloned()
            .ok_or(StoreError::ChunkNotFound(*address))?;
        Chunk::new(data)
    }

    fn store(&self, chunk: Chunk) -> Result<ChunkAddress> {
        let address = chunk.address();
        trace!(%address, "storing chunk");
        self.chunks.write().insert(address, chunk.into_bytes());
        Ok(address)
    }
}

//! Chunk traffic counters.
//!
//! [`Stats`] is owned by a [`StatsStore`], which wraps any [`ChunkStore`] and
//! records every retrieval and store passing through it. Counters are read
//! with [`Stats::snapshot`] and drained with [`Stats::reset`].
//!
//! ```
//! use comb_primitives::{ChunkStore, ChunkStoreExt, MemoryChunkStore, StatsStore};
//!
//! let store = StatsStore::new(MemoryChunkStore::new());
//! let address = store.store_bytes(b"counted").unwrap();
//! store.retrieve(&address).unwrap();
//!
//! let stats = store.stats().snapshot();
//! assert_eq!(stats.chunk_writes, 1);
//! assert_eq!(stats.chunk_reads, 1);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{CHUNK_SIZE, Chunk, ChunkAddress, ChunkStore, StoreError, error::Result};

/// Counters for chunk traffic through one store handle
#[derive(Debug, Default)]
pub struct Stats {
    chunk_reads: AtomicU64,
    chunk_writes: AtomicU64,
    read_misses: AtomicU64,
    write_failures: AtomicU64,
}

/// A point-in-time copy of [`Stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatsSnapshot {
    /// Successful retrievals
    pub chunk_reads: u64,
    /// Successful stores
    pub chunk_writes: u64,
    /// Retrievals of an address with no chunk behind it
    pub read_misses: u64,
    /// Stores rejected by the backend
    pub write_failures: u64,
}

impl StatsSnapshot {
    /// Bytes read, derived from the fixed chunk size
    pub const fn bytes_read(&self) -> u64 {
        self.chunk_reads * CHUNK_SIZE as u64
    }

    /// Bytes written, derived from the fixed chunk size
    pub const fn bytes_written(&self) -> u64 {
        self.chunk_writes * CHUNK_SIZE as u64
    }
}

impl Stats {
    /// Creates zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunk_reads: self.chunk_reads.load(Ordering::Relaxed),
            chunk_writes: self.chunk_writes.load(Ordering::Relaxed),
            read_misses: self.read_misses.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Zeroes all counters and returns the values they held
    pub fn reset(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunk_reads: self.chunk_reads.swap(0, Ordering::Relaxed),
            chunk_writes: self.chunk_writes.swap(0, Ordering::Relaxed),
            read_misses: self.read_misses.swap(0, Ordering::Relaxed),
            write_failures: self.write_failures.swap(0, Ordering::Relaxed),
        }
    }

    fn record_read(&self, result: &Result<Chunk>) {
        match result {
            Ok(_) => self.chunk_reads.fetch_add(1, Ordering::Relaxed),
            Err(StoreError::ChunkNotFound(_)) => self.read_misses.fetch_add(1, Ordering::Relaxed),
            Err(_) => 0,
        };
    }

    fn record_write(&self, result: &Result<ChunkAddress>) {
        match result {
            Ok(_) => self.chunk_writes.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.write_failures.fetch_add(1, Ordering::Relaxed),
        };
    }
}

/// A [`ChunkStore`] wrapper that owns a [`Stats`] instance
#[derive(Debug, Clone)]
pub struct StatsStore<S> {
    inner: S,
    stats: Arc<Stats>,
}

impl<S> StatsStore<S> {
    /// Wraps `inner` with fresh counters
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            stats: Arc::new(Stats::new()),
        }
    }

    /// The counters of this store; clones of the store share them
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// The wrapped store
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: ChunkStore> ChunkStore for StatsStore<S> {
    fn retrieve(&self, address: &ChunkAddress) -> Result<Chunk> {
        let result = self.inner.retrieve(address);
        self.stats.record_read(&result);
        result
    }

    fn store(&self, chunk: Chunk) -> Result<ChunkAddress> {
        let result = self.inner.store(chunk);
        self.stats.record_write(&result);
        result
    }
}

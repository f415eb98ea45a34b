//! Core primitives for a content-addressed storage engine
//!
//! This crate provides the fundamental types every layer of comb builds on:
//! fixed-size chunks, their content addresses, and the chunk store contract.
//!
//! ## Key Components
//!
//! - **Chunks**: immutable, zero-padded blocks of [`CHUNK_SIZE`] bytes ([`Chunk`])
//! - **ChunkAddress**: 256-bit content addresses
//! - **Chunk stores**: the [`ChunkStore`] trait, an in-memory implementation,
//!   and a [`StatsStore`] wrapper that counts chunk traffic
//!
//! ## Usage Examples
//!
//! ```
//! use comb_primitives::{Chunk, ChunkStore, MemoryChunkStore};
//!
//! let store = MemoryChunkStore::new();
//! let chunk = Chunk::new(&b"Hello, world!"[..]).unwrap();
//! let address = store.store(chunk.clone()).unwrap();
//!
//! assert_eq!(address, chunk.address());
//! assert_eq!(store.retrieve(&address).unwrap(), chunk);
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

// Re-export dependencies that are part of our public API
pub use alloy_primitives::B256;
pub use bytes;

pub mod address;
pub mod chunk;
pub mod error;
pub mod stats;
pub mod store;

pub use address::{ADDRESS_LENGTH, ChunkAddress};
pub use chunk::{CHUNK_SIZE, Chunk};
pub use error::{Result, StoreError};
pub use stats::{Stats, StatsSnapshot, StatsStore};
pub use store::{ChunkStore, ChunkStoreExt, MemoryChunkStore};

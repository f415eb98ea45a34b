//! Chunk-persisted indexes mapping fixed-size keys to content addresses
//!
//! Two index kinds share the [`Index`] contract:
//!
//! - [`BPlusTree`]: keeps keys in the order of its [`KeyType`] and supports
//!   seeks and range traversal through [`OrderedIndex`]
//! - [`HashTrie`]: a 64-ary trie routed by the SHA3-256 hash of the key,
//!   with point lookups and an unordered traversal
//!
//! Both load nodes lazily from a [`comb_primitives::ChunkStore`], mark
//! mutated nodes dirty and write them back bottom-up on flush, so the root
//! hash identifies the whole index.
//!
//! ## Usage Examples
//!
//! ```
//! use comb_index::{HashTrie, Index, IndexKey};
//! use comb_primitives::{ChunkAddress, MemoryChunkStore};
//!
//! let mut trie = HashTrie::new(MemoryChunkStore::new());
//! let key = IndexKey::try_from("alice").unwrap();
//! trie.put(&key, ChunkAddress::keccak(b"row")).unwrap();
//! assert_eq!(trie.get(&key).unwrap(), Some(ChunkAddress::keccak(b"row")));
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod arena;
pub mod bplus;
pub mod error;
pub mod key;
pub mod traits;
pub mod trie;

pub use bplus::{BPlusTree, Cursor, Fanout, TreeShape};
pub use error::{IndexError, Result};
pub use key::{IndexKey, KEY_SIZE, KeyType};
pub use traits::{Index, IndexCursor, OrderedIndex, PutOutcome};
pub use trie::{HashTrie, TrieCursor};

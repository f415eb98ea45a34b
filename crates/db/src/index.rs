//! The index behind a column.

use comb_index::{
    BPlusTree, Fanout, HashTrie, Index, IndexCursor, IndexKey, OrderedIndex, PutOutcome,
    Result as IndexResult,
};
use comb_primitives::{ChunkAddress, ChunkStore};

use crate::column::{Column, IndexType};

/// One of the two index kinds a column can declare
///
/// Every operation of [`Index`] is available on both; key-ordered access
/// is only reachable through [`ColumnIndex::as_ordered_mut`].
#[derive(Debug)]
pub enum ColumnIndex<S> {
    /// Ordered B+tree
    BPlusTree(BPlusTree<S>),
    /// Hash trie, traversed in bin order
    HashTrie(HashTrie<S>),
}

impl<S: ChunkStore> ColumnIndex<S> {
    /// Opens the index of `column` persisted under `root_hash`
    pub fn open(store: S, column: &Column, root_hash: ChunkAddress, fanout: Fanout) -> Self {
        match column.index_type {
            IndexType::BPlusTree => {
                Self::BPlusTree(BPlusTree::open_with_fanout(store, column.column_type, root_hash, fanout))
            }
            IndexType::HashTrie => Self::HashTrie(HashTrie::open(store, root_hash)),
        }
    }

    /// The declared index kind
    pub const fn index_type(&self) -> IndexType {
        match self {
            Self::BPlusTree(_) => IndexType::BPlusTree,
            Self::HashTrie(_) => IndexType::HashTrie,
        }
    }

    /// The index as an ordered one, if it is
    pub const fn as_ordered_mut(&mut self) -> Option<&mut BPlusTree<S>> {
        match self {
            Self::BPlusTree(tree) => Some(tree),
            Self::HashTrie(_) => None,
        }
    }

    /// Every entry, in key order for a B+tree and bin order for a trie
    pub fn entries(&mut self, forward: bool) -> IndexResult<Vec<(IndexKey, ChunkAddress)>> {
        match self {
            Self::BPlusTree(tree) => {
                let cursor = if forward { tree.seek_first()? } else { tree.seek_last()? };
                drain(cursor, forward)
            }
            Self::HashTrie(trie) => {
                let cursor = if forward { trie.seek_first()? } else { trie.seek_last()? };
                drain(cursor, forward)
            }
        }
    }
}

fn drain<C: IndexCursor>(mut cursor: C, forward: bool) -> IndexResult<Vec<(IndexKey, ChunkAddress)>> {
    let mut entries = Vec::new();
    loop {
        let entry = if forward { cursor.next()? } else { cursor.prev()? };
        match entry {
            Some(entry) => entries.push(entry),
            None => return Ok(entries),
        }
    }
}

impl<S: ChunkStore> Index for ColumnIndex<S> {
    fn get(&mut self, key: &IndexKey) -> IndexResult<Option<ChunkAddress>> {
        match self {
            Self::BPlusTree(index) => index.get(key),
            Self::HashTrie(index) => index.get(key),
        }
    }

    fn put(&mut self, key: &IndexKey, value: ChunkAddress) -> IndexResult<PutOutcome> {
        match self {
            Self::BPlusTree(index) => index.put(key, value),
            Self::HashTrie(index) => index.put(key, value),
        }
    }

    fn insert(&mut self, key: &IndexKey, value: ChunkAddress) -> IndexResult<()> {
        match self {
            Self::BPlusTree(index) => index.insert(key, value),
            Self::HashTrie(index) => index.insert(key, value),
        }
    }

    fn delete(&mut self, key: &IndexKey) -> IndexResult<bool> {
        match self {
            Self::BPlusTree(index) => index.delete(key),
            Self::HashTrie(index) => index.delete(key),
        }
    }

    fn start_buffer(&mut self) {
        match self {
            Self::BPlusTree(index) => index.start_buffer(),
            Self::HashTrie(index) => index.start_buffer(),
        }
    }

    fn flush_buffer(&mut self) -> IndexResult<ChunkAddress> {
        match self {
            Self::BPlusTree(index) => index.flush_buffer(),
            Self::HashTrie(index) => index.flush_buffer(),
        }
    }

    fn discard_buffer(&mut self) -> IndexResult<()> {
        match self {
            Self::BPlusTree(index) => index.discard_buffer(),
            Self::HashTrie(index) => index.discard_buffer(),
        }
    }

    fn is_buffered(&self) -> bool {
        match self {
            Self::BPlusTree(index) => index.is_buffered(),
            Self::HashTrie(index) => index.is_buffered(),
        }
    }

    fn root_hash(&self) -> ChunkAddress {
        match self {
            Self::BPlusTree(index) => index.root_hash(),
            Self::HashTrie(index) => index.root_hash(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;
    use comb_primitives::MemoryChunkStore;

    fn filled(index_type: IndexType) -> ColumnIndex<MemoryChunkStore> {
        let column = Column::primary("id", ColumnType::Integer, index_type);
        let mut index = ColumnIndex::open(MemoryChunkStore::new(), &column, ChunkAddress::zero(), Fanout::DEFAULT);
        for i in [5i64, 1, 9, 3, 7] {
            index.put(&IndexKey::from_i64(i), ChunkAddress::keccak(&i.to_be_bytes())).unwrap();
        }
        index
    }

    #[test]
    fn test_entries_in_key_order() {
        let mut index = filled(IndexType::BPlusTree);
        assert_eq!(index.index_type(), IndexType::BPlusTree);
        let keys: Vec<i64> = index.entries(true).unwrap().iter().map(|(k, _)| k.as_i64()).collect();
        assert_eq!(keys, [1, 3, 5, 7, 9]);
        let keys: Vec<i64> = index.entries(false).unwrap().iter().map(|(k, _)| k.as_i64()).collect();
        assert_eq!(keys, [9, 7, 5, 3, 1]);
    }

    #[test]
    fn test_trie_is_not_ordered() {
        let mut index = filled(IndexType::HashTrie);
        assert!(index.as_ordered_mut().is_none());
        let mut forward = index.entries(true).unwrap();
        let mut backward = index.entries(false).unwrap();
        assert_eq!(forward.len(), 5);
        backward.reverse();
        assert_eq!(forward, backward);
        forward.sort_by_key(|(k, _)| k.as_i64());
        assert_eq!(forward[0].1, ChunkAddress::keccak(&1i64.to_be_bytes()));
    }

    #[test]
    fn test_delegates_buffering() {
        let mut index = filled(IndexType::HashTrie);
        let root = index.root_hash();
        index.start_buffer();
        assert!(index.is_buffered());
        index.delete(&IndexKey::from_i64(5)).unwrap();
        assert_eq!(index.root_hash(), root);
        index.discard_buffer().unwrap();
        assert!(index.get(&IndexKey::from_i64(5)).unwrap().is_some());
    }
}

//! Unordered 64-ary hash trie persisted as chunks.
//!
//! A key is routed by the SHA3-256 hash of its 32-byte slot: a branch at
//! level `d` picks the bin given by bits `6d .. 6d + 6` of that hash. The
//! root is always a branch at level zero. Two leaves competing for a bin
//! are pushed down into a fresh branch at the next level, and a non-root
//! branch left with a single leaf hands that leaf up to its parent.
//!
//! Traversal visits leaves in bin order, which has nothing to do with key
//! order, so [`HashTrie`] implements [`Index`] but not
//! [`crate::OrderedIndex`].

mod cursor;
mod node;

#[cfg(test)]
mod tests;

use alloy_primitives::B256;
use comb_primitives::{ChunkAddress, ChunkStore};
use tracing::{debug, trace};

pub use cursor::TrieCursor;
use node::{BINS, MAX_LEVEL, Slot, TrieBranch, TrieLeaf, TrieNode};

use crate::{
    Index, IndexError, IndexKey, PutOutcome, Result,
    arena::{Arena, NodeId},
};

/// What remains of a branch after a delete below it
enum Remainder {
    Empty,
    Leaf(Slot),
    Keep,
}

/// An unordered index from [`IndexKey`] to [`ChunkAddress`]
#[derive(Debug)]
pub struct HashTrie<S> {
    store: S,
    arena: Arena<TrieNode>,
    root: Option<Slot>,
    root_hash: ChunkAddress,
    buffered: bool,
}

impl<S: ChunkStore> HashTrie<S> {
    /// Creates an empty trie
    pub fn new(store: S) -> Self {
        Self::open(store, ChunkAddress::zero())
    }

    /// Opens the trie persisted under `root_hash`; zero opens an empty trie
    pub fn open(store: S, root_hash: ChunkAddress) -> Self {
        Self {
            store,
            arena: Arena::new(),
            root: root_hash.non_zero().map(Slot::Stored),
            root_hash,
            buffered: false,
        }
    }

    /// Number of nodes currently held in memory
    pub const fn resident_nodes(&self) -> usize {
        self.arena.len()
    }

    /// Number of branches passed on the way to `key`, if present
    pub fn depth_of(&mut self, key: &IndexKey) -> Result<Option<usize>> {
        Ok(self
            .find(key)?
            .filter(|(leaf, _)| self.leaf(*leaf).key == *key)
            .map(|(_, depth)| depth))
    }

    /// Writes every dirty node and returns the new root hash
    pub fn flush(&mut self) -> Result<ChunkAddress> {
        let hash = match self.root {
            None => ChunkAddress::zero(),
            Some(Slot::Stored(hash)) => hash,
            Some(Slot::Loaded(id)) => {
                let mut written = 0;
                let hash = self.persist(id, &mut written)?;
                if written > 0 {
                    debug!(root = %hash, nodes = written, "flushed hash trie");
                }
                hash
            }
        };
        self.root_hash = hash;
        Ok(hash)
    }

    /// Verifies levels, bin placement and that no non-root branch could be
    /// collapsed; returns the number of entries
    ///
    /// Loads the whole trie.
    pub fn check_invariants(&mut self) -> Result<usize> {
        let Some(root) = self.root_id()? else {
            return Ok(0);
        };
        if self.branch(root).level != 0 {
            return Err(IndexError::InvariantViolated("root branch not at level 0".into()));
        }
        let mut entries = 0;
        self.check_branch(root, true, &mut entries)?;
        Ok(entries)
    }

    /// Positions a cursor at the first leaf in bin order
    pub fn seek_first(&mut self) -> Result<TrieCursor<'_, S>> {
        TrieCursor::first(self, true)
    }

    /// Positions a cursor at the last leaf in bin order
    pub fn seek_last(&mut self) -> Result<TrieCursor<'_, S>> {
        TrieCursor::first(self, false)
    }

    /// Positions a cursor at `key`
    ///
    /// When `key` is absent the cursor is returned exhausted and the flag
    /// is false.
    pub fn seek(&mut self, key: &IndexKey) -> Result<(TrieCursor<'_, S>, bool)> {
        let hash = node::key_hash(key);
        let Some(root) = self.root_id()? else {
            return Ok((TrieCursor::exhausted(self), false));
        };

        let mut stack = Vec::new();
        let mut id = root;
        loop {
            let b = node::bin(&hash, self.branch(id).level);
            if self.branch(id).bins[b].is_none() {
                return Ok((TrieCursor::exhausted(self), false));
            }
            let child = self.load_bin(id, b)?;
            stack.push((id, b));
            let hit = match &self.arena[child] {
                TrieNode::Branch(_) => None,
                TrieNode::Leaf(leaf) => Some(leaf.key == *key),
            };
            match hit {
                None => id = child,
                Some(true) => return Ok((TrieCursor::at(self, stack), true)),
                Some(false) => return Ok((TrieCursor::exhausted(self), false)),
            }
        }
    }

    fn check_flush(&mut self) -> Result<()> {
        if !self.buffered {
            self.flush()?;
        }
        Ok(())
    }

    fn branch(&self, id: NodeId) -> &TrieBranch {
        match &self.arena[id] {
            TrieNode::Branch(branch) => branch,
            TrieNode::Leaf(_) => unreachable!("expected a trie branch"),
        }
    }

    fn branch_mut(&mut self, id: NodeId) -> &mut TrieBranch {
        match &mut self.arena[id] {
            TrieNode::Branch(branch) => branch,
            TrieNode::Leaf(_) => unreachable!("expected a trie branch"),
        }
    }

    fn leaf(&self, id: NodeId) -> &TrieLeaf {
        match &self.arena[id] {
            TrieNode::Leaf(leaf) => leaf,
            TrieNode::Branch(_) => unreachable!("expected a trie leaf"),
        }
    }

    fn touch(&mut self, id: NodeId) {
        self.arena[id].set_hash(None);
    }

    fn load(&mut self, hash: ChunkAddress) -> Result<NodeId> {
        let chunk = self.store.retrieve(&hash)?;
        let node = node::decode(&chunk, hash)?;
        trace!(%hash, leaf = node.is_leaf(), "loaded trie node");
        Ok(self.arena.alloc(node))
    }

    fn root_id(&mut self) -> Result<Option<NodeId>> {
        match self.root {
            None => Ok(None),
            Some(Slot::Loaded(id)) => Ok(Some(id)),
            Some(Slot::Stored(hash)) => {
                let id = self.load(hash)?;
                if !matches!(&self.arena[id], TrieNode::Branch(root) if root.level == 0) {
                    return Err(IndexError::malformed(hash, "trie root is not a level 0 branch"));
                }
                self.root = Some(Slot::Loaded(id));
                Ok(Some(id))
            }
        }
    }

    /// Resolves bin `b` of `parent`, which must be occupied
    fn load_bin(&mut self, parent: NodeId, b: usize) -> Result<NodeId> {
        match self.branch(parent).bins[b] {
            Some(Slot::Loaded(id)) => Ok(id),
            Some(Slot::Stored(hash)) => {
                let id = self.load(hash)?;
                if let TrieNode::Branch(child) = &self.arena[id] {
                    let expected = self.branch(parent).level + 1;
                    if child.level != expected {
                        return Err(IndexError::malformed(
                            hash,
                            format!("trie branch at level {} below level {}", child.level, expected - 1),
                        ));
                    }
                }
                self.branch_mut(parent).bins[b] = Some(Slot::Loaded(id));
                Ok(id)
            }
            None => unreachable!("empty trie bin"),
        }
    }

    /// Leaf whose bin path matches `key`'s hash, with its depth
    fn find(&mut self, key: &IndexKey) -> Result<Option<(NodeId, usize)>> {
        let hash = node::key_hash(key);
        let Some(mut id) = self.root_id()? else {
            return Ok(None);
        };
        let mut depth = 1;
        loop {
            let b = node::bin(&hash, self.branch(id).level);
            if self.branch(id).bins[b].is_none() {
                return Ok(None);
            }
            let child = self.load_bin(id, b)?;
            if self.arena[child].is_leaf() {
                return Ok(Some((child, depth)));
            }
            id = child;
            depth += 1;
        }
    }

    fn persist(&mut self, id: NodeId, written: &mut usize) -> Result<ChunkAddress> {
        if let Some(hash) = self.arena[id].hash() {
            return Ok(hash);
        }

        let chunk = match &self.arena[id] {
            TrieNode::Leaf(leaf) => node::encode_leaf(leaf),
            TrieNode::Branch(branch) => {
                let level = branch.level;
                let bins = *branch.bins;
                let mut hashes = [ChunkAddress::zero(); BINS];
                for (hash, slot) in hashes.iter_mut().zip(bins) {
                    *hash = match slot {
                        None => ChunkAddress::zero(),
                        Some(Slot::Stored(hash)) => hash,
                        Some(Slot::Loaded(child)) => self.persist(child, written)?,
                    };
                }
                node::encode_branch(level, &hashes)
            }
        };

        let hash = self.store.store(chunk)?;
        self.arena[id].set_hash(Some(hash));
        *written += 1;
        Ok(hash)
    }

    fn upsert(&mut self, key: &IndexKey, value: ChunkAddress, overwrite: bool) -> Result<PutOutcome> {
        let hash = node::key_hash(key);
        let root = match self.root_id()? {
            Some(root) => root,
            None => {
                let root = self.arena.alloc(TrieNode::Branch(TrieBranch::new(0)));
                self.root = Some(Slot::Loaded(root));
                root
            }
        };

        let mut path = Vec::new();
        let mut id = root;
        let outcome = loop {
            let level = self.branch(id).level;
            let b = node::bin(&hash, level);
            path.push(id);

            if self.branch(id).bins[b].is_none() {
                let leaf = self.arena.alloc(TrieNode::Leaf(TrieLeaf::new(*key, value)));
                self.branch_mut(id).bins[b] = Some(Slot::Loaded(leaf));
                break PutOutcome::Inserted;
            }

            let child = self.load_bin(id, b)?;
            let existing = match &mut self.arena[child] {
                TrieNode::Branch(_) => {
                    id = child;
                    continue;
                }
                TrieNode::Leaf(leaf) if leaf.key == *key => {
                    if !overwrite {
                        return Err(IndexError::DuplicateKey);
                    }
                    leaf.value = value;
                    leaf.hash = None;
                    break PutOutcome::Updated;
                }
                TrieNode::Leaf(leaf) => leaf.key_hash,
            };

            // the displaced leaf moves one level down; the loop then keeps
            // pushing both apart until their bins differ
            if node::divergence(&existing, &hash, level + 1).is_none() {
                return Err(IndexError::TrieDepthExceeded(MAX_LEVEL + 1));
            }
            let mut branch = TrieBranch::new(level + 1);
            branch.bins[node::bin(&existing, level + 1)] = Some(Slot::Loaded(child));
            let branch = self.arena.alloc(TrieNode::Branch(branch));
            self.branch_mut(id).bins[b] = Some(Slot::Loaded(branch));
            id = branch;
        };

        for id in path {
            self.touch(id);
        }
        Ok(outcome)
    }

    fn remove(&mut self, key: &IndexKey) -> Result<bool> {
        let Some(root) = self.root_id()? else {
            return Ok(false);
        };
        let hash = node::key_hash(key);
        if !self.remove_below(root, key, &hash)? {
            return Ok(false);
        }
        if self.branch(root).occupied().next().is_none() {
            self.arena.remove(root);
            self.root = None;
        }
        Ok(true)
    }

    fn remove_below(&mut self, id: NodeId, key: &IndexKey, hash: &B256) -> Result<bool> {
        let b = node::bin(hash, self.branch(id).level);
        if self.branch(id).bins[b].is_none() {
            return Ok(false);
        }
        let child = self.load_bin(id, b)?;

        match &self.arena[child] {
            TrieNode::Leaf(leaf) => {
                if leaf.key != *key {
                    return Ok(false);
                }
                self.arena.remove(child);
                self.branch_mut(id).bins[b] = None;
            }
            TrieNode::Branch(_) => {
                if !self.remove_below(child, key, hash)? {
                    return Ok(false);
                }
                match self.remainder(child)? {
                    Remainder::Empty => {
                        self.arena.remove(child);
                        self.branch_mut(id).bins[b] = None;
                    }
                    Remainder::Leaf(slot) => {
                        self.arena.remove(child);
                        self.branch_mut(id).bins[b] = Some(slot);
                    }
                    Remainder::Keep => {}
                }
            }
        }
        self.touch(id);
        Ok(true)
    }

    /// Classifies a non-root branch after one of its entries was removed
    fn remainder(&mut self, id: NodeId) -> Result<Remainder> {
        let (first, more) = {
            let mut occupied = self.branch(id).occupied();
            (occupied.next(), occupied.next().is_some())
        };
        let Some((b, _)) = first else {
            return Ok(Remainder::Empty);
        };
        if more {
            return Ok(Remainder::Keep);
        }
        let only = self.load_bin(id, b)?;
        Ok(if self.arena[only].is_leaf() {
            Remainder::Leaf(Slot::Loaded(only))
        } else {
            Remainder::Keep
        })
    }

    fn check_branch(&mut self, id: NodeId, is_root: bool, entries: &mut usize) -> Result<()> {
        let level = self.branch(id).level;
        let bins: Vec<usize> = self.branch(id).occupied().map(|(b, _)| b).collect();
        if !is_root && bins.is_empty() {
            return Err(IndexError::InvariantViolated(format!("empty branch at level {level}")));
        }

        let mut leaves = 0;
        for b in bins.iter().copied() {
            let child = self.load_bin(id, b)?;
            match &self.arena[child] {
                TrieNode::Leaf(leaf) => {
                    if node::bin(&leaf.key_hash, level) != b {
                        return Err(IndexError::InvariantViolated(format!(
                            "key {:?} in bin {b} at level {level}",
                            leaf.key
                        )));
                    }
                    leaves += 1;
                    *entries += 1;
                }
                TrieNode::Branch(_) => self.check_branch(child, false, entries)?,
            }
        }
        if !is_root && bins.len() == 1 && leaves == 1 {
            return Err(IndexError::InvariantViolated(format!(
                "branch at level {level} holds a single leaf"
            )));
        }
        Ok(())
    }
}

impl<S: ChunkStore> Index for HashTrie<S> {
    fn get(&mut self, key: &IndexKey) -> Result<Option<ChunkAddress>> {
        Ok(self.find(key)?.and_then(|(leaf, _)| {
            let leaf = self.leaf(leaf);
            (leaf.key == *key).then_some(leaf.value)
        }))
    }

    fn put(&mut self, key: &IndexKey, value: ChunkAddress) -> Result<PutOutcome> {
        let outcome = self.upsert(key, value, true)?;
        trace!(?key, ?outcome, "hash trie put");
        self.check_flush()?;
        Ok(outcome)
    }

    fn insert(&mut self, key: &IndexKey, value: ChunkAddress) -> Result<()> {
        self.upsert(key, value, false)?;
        self.check_flush()
    }

    fn delete(&mut self, key: &IndexKey) -> Result<bool> {
        let found = self.remove(key)?;
        if found {
            trace!(?key, "hash trie delete");
            self.check_flush()?;
        }
        Ok(found)
    }

    fn start_buffer(&mut self) {
        self.buffered = true;
    }

    fn flush_buffer(&mut self) -> Result<ChunkAddress> {
        let hash = self.flush()?;
        self.buffered = false;
        Ok(hash)
    }

    fn discard_buffer(&mut self) -> Result<()> {
        if !self.buffered {
            return Err(IndexError::BufferNotStarted);
        }
        self.arena.clear();
        self.root = self.root_hash.non_zero().map(Slot::Stored);
        self.buffered = false;
        debug!(root = %self.root_hash, "discarded buffered hash trie changes");
        Ok(())
    }

    fn is_buffered(&self) -> bool {
        self.buffered
    }

    fn root_hash(&self) -> ChunkAddress {
        self.root_hash
    }
}

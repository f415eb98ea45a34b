//! Bin-order traversal over a [`HashTrie`].

use comb_primitives::{ChunkAddress, ChunkStore};

use super::{BINS, HashTrie, TrieNode};
use crate::{IndexCursor, IndexKey, Result, arena::NodeId};

/// A position in a [`HashTrie`]
///
/// Leaves are visited by ascending (or descending) bin at every level, so
/// the sequence is stable for a given set of keys but unrelated to key
/// order. The stack holds one `(branch, bin)` frame per level down to the
/// current leaf.
#[derive(Debug)]
pub struct TrieCursor<'a, S> {
    trie: &'a mut HashTrie<S>,
    stack: Vec<(NodeId, usize)>,
    exhausted: bool,
}

impl<'a, S: ChunkStore> TrieCursor<'a, S> {
    pub(super) const fn at(trie: &'a mut HashTrie<S>, stack: Vec<(NodeId, usize)>) -> Self {
        Self {
            trie,
            stack,
            exhausted: false,
        }
    }

    pub(super) const fn exhausted(trie: &'a mut HashTrie<S>) -> Self {
        Self {
            trie,
            stack: Vec::new(),
            exhausted: true,
        }
    }

    pub(super) fn first(trie: &'a mut HashTrie<S>, forward: bool) -> Result<Self> {
        let Some(root) = trie.root_id()? else {
            return Ok(Self::exhausted(trie));
        };
        let mut cursor = Self::at(trie, Vec::new());
        if !cursor.descend(root, forward, None)? {
            cursor.exhausted = true;
        }
        Ok(cursor)
    }

    /// Whether the cursor has reported the end of the sequence
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Pushes frames down to the first leaf of `branch` in the given
    /// direction, starting after bin `after` when set
    fn descend(&mut self, branch: NodeId, forward: bool, after: Option<usize>) -> Result<bool> {
        let bins: Vec<usize> = if forward {
            (after.map_or(0, |b| b + 1)..BINS).collect()
        } else {
            (0..after.unwrap_or(BINS)).rev().collect()
        };

        for b in bins {
            if self.trie.branch(branch).bins[b].is_none() {
                continue;
            }
            let child = self.trie.load_bin(branch, b)?;
            self.stack.push((branch, b));
            if self.trie.arena[child].is_leaf() || self.descend(child, forward, None)? {
                return Ok(true);
            }
            self.stack.pop();
        }
        Ok(false)
    }

    /// Moves to the neighbouring leaf, returning false past either end
    fn advance(&mut self, forward: bool) -> Result<bool> {
        while let Some((branch, b)) = self.stack.pop() {
            if self.descend(branch, forward, Some(b))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn current(&self) -> Option<(IndexKey, ChunkAddress)> {
        let (branch, b) = *self.stack.last()?;
        let super::Slot::Loaded(id) = self.trie.branch(branch).bins[b]? else {
            return None;
        };
        match &self.trie.arena[id] {
            TrieNode::Leaf(leaf) => Some((leaf.key, leaf.value)),
            TrieNode::Branch(_) => None,
        }
    }

    fn step(&mut self, forward: bool) -> Result<Option<(IndexKey, ChunkAddress)>> {
        if self.exhausted {
            return Ok(None);
        }
        let Some(entry) = self.current() else {
            self.exhausted = true;
            return Ok(None);
        };
        if !self.advance(forward)? {
            self.exhausted = true;
        }
        Ok(Some(entry))
    }
}

impl<S: ChunkStore> IndexCursor for TrieCursor<'_, S> {
    fn next(&mut self) -> Result<Option<(IndexKey, ChunkAddress)>> {
        self.step(true)
    }

    fn prev(&mut self) -> Result<Option<(IndexKey, ChunkAddress)>> {
        self.step(false)
    }
}

//! Ordered traversal over a [`BPlusTree`].

use comb_primitives::{ChunkAddress, ChunkStore};

use super::BPlusTree;
use crate::{IndexCursor, IndexKey, Result, arena::NodeId};

/// A position in a [`BPlusTree`]
///
/// The cursor keeps the branch path down to its current leaf and moves to
/// neighbouring leaves through that path, reading them from the store when
/// they are not resident. After [`IndexCursor::next`] or
/// [`IndexCursor::prev`] has reported the end of the sequence the cursor
/// stays exhausted.
#[derive(Debug)]
pub struct Cursor<'a, S> {
    tree: &'a mut BPlusTree<S>,
    path: Vec<(NodeId, usize)>,
    leaf: Option<NodeId>,
    pos: usize,
    /// False after a seek that stopped past the requested key
    hit: bool,
    exhausted: bool,
}

impl<'a, S: ChunkStore> Cursor<'a, S> {
    pub(super) const fn at(
        tree: &'a mut BPlusTree<S>,
        path: Vec<(NodeId, usize)>,
        leaf: NodeId,
        pos: usize,
        hit: bool,
    ) -> Self {
        Self {
            tree,
            path,
            leaf: Some(leaf),
            pos,
            hit,
            exhausted: false,
        }
    }

    pub(super) const fn exhausted(tree: &'a mut BPlusTree<S>) -> Self {
        Self {
            tree,
            path: Vec::new(),
            leaf: None,
            pos: 0,
            hit: true,
            exhausted: true,
        }
    }

    /// Whether the cursor has reported the end of the sequence
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Moves to the leaf after (or before) the current one
    fn step(&mut self, forward: bool) -> Result<Option<NodeId>> {
        for depth in (0..self.path.len()).rev() {
            let (branch, i) = self.path[depth];
            let children = self.tree.branch(branch).children.len();
            let next = if forward {
                (i + 1 < children).then_some(i + 1)
            } else {
                i.checked_sub(1)
            };
            let Some(j) = next else {
                continue;
            };

            self.path.truncate(depth + 1);
            self.path[depth].1 = j;
            let child = self.tree.load_child(branch, j)?;
            let leaf = self.tree.descend_edge(child, &mut self.path, !forward)?;
            self.leaf = Some(leaf);
            return Ok(Some(leaf));
        }
        Ok(None)
    }

    /// Moves one entry back, returning false at the start of the tree
    fn retreat(&mut self) -> Result<bool> {
        if self.pos > 0 {
            self.pos -= 1;
            return Ok(true);
        }
        match self.step(false)? {
            Some(leaf) => {
                self.pos = self.tree.leaf(leaf).entries.len().saturating_sub(1);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl<S: ChunkStore> IndexCursor for Cursor<'_, S> {
    fn next(&mut self) -> Result<Option<(IndexKey, ChunkAddress)>> {
        let Some(mut leaf) = self.leaf.filter(|_| !self.exhausted) else {
            return Ok(None);
        };
        while self.pos >= self.tree.leaf(leaf).entries.len() {
            match self.step(true)? {
                Some(next) => {
                    leaf = next;
                    self.pos = 0;
                }
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
            }
        }

        let entry = self.tree.leaf(leaf).entries[self.pos];
        self.pos += 1;
        self.hit = true;
        Ok(Some(entry))
    }

    fn prev(&mut self) -> Result<Option<(IndexKey, ChunkAddress)>> {
        if self.exhausted || self.leaf.is_none() {
            return Ok(None);
        }
        if !self.hit {
            self.hit = true;
            if !self.retreat()? {
                self.exhausted = true;
                return Ok(None);
            }
        }

        let Some(leaf) = self.leaf else {
            return Ok(None);
        };
        let Some(entry) = self.tree.leaf(leaf).entries.get(self.pos).copied() else {
            self.exhausted = true;
            return Ok(None);
        };
        if !self.retreat()? {
            self.exhausted = true;
        }
        Ok(Some(entry))
    }
}

//! Ordered B+tree index persisted as chunks.
//!
//! Leaves hold up to `2 * kd` `(key, value)` entries and branches up to
//! `2 * kx + 1` separators. Inserts redistribute into a sibling with spare
//! room before splitting; deletes borrow from a sibling before merging.
//! Branches that are full (on insert) or thin (on delete) are fixed while
//! descending, so no operation ever has to walk back up the tree.
//!
//! Nodes are read from the [`ChunkStore`] the first time a descent reaches
//! them and live in the tree's arena afterwards. A mutated node forgets its
//! hash; [`BPlusTree::flush`] writes every such node bottom-up and yields the
//! new root hash.
//!
//! ## Example
//!
//! ```
//! use comb_index::{BPlusTree, Index, IndexCursor, IndexKey, KeyType, OrderedIndex};
//! use comb_primitives::{ChunkAddress, MemoryChunkStore};
//!
//! let store = MemoryChunkStore::new();
//! let mut tree = BPlusTree::new(store.clone(), KeyType::Integer);
//! for k in [5, 3, 8, 1] {
//!     tree.put(&IndexKey::from_i64(k), ChunkAddress::keccak(&k.to_be_bytes())).unwrap();
//! }
//!
//! // a second handle opened at the persisted root sees the same data
//! let mut reader = BPlusTree::open(store, KeyType::Integer, tree.root_hash());
//! let mut cursor = reader.seek_first().unwrap();
//! let mut keys = Vec::new();
//! while let Some((key, _)) = cursor.next().unwrap() {
//!     keys.push(key.as_i64());
//! }
//! assert_eq!(keys, [1, 3, 5, 8]);
//! ```

mod cursor;
mod node;

#[cfg(test)]
mod tests;

use core::cmp::Ordering;

use comb_primitives::{ChunkAddress, ChunkStore};
use tracing::{debug, trace};

pub use cursor::Cursor;
use node::{Branch, Child, Leaf, MAX_ENTRIES, Node, NodeKind, NodeState};

use crate::{
    Index, IndexError, IndexKey, KeyType, OrderedIndex, PutOutcome, Result,
    arena::{Arena, NodeId},
};

/// Node capacity parameters
///
/// A leaf holds between `leaf` and `2 * leaf` entries and a branch between
/// `branch` and `2 * branch + 2` children, the root excepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fanout {
    /// Leaf fanout (`kd`)
    pub leaf: usize,
    /// Branch fanout (`kx`)
    pub branch: usize,
}

impl Fanout {
    /// Three for both node kinds
    pub const DEFAULT: Self = Self { leaf: 3, branch: 3 };

    /// Validates that both node kinds fit into one chunk
    pub fn new(leaf: usize, branch: usize) -> Result<Self> {
        if leaf < 2 || branch < 2 || 2 * leaf > MAX_ENTRIES || 2 * branch + 2 > MAX_ENTRIES {
            return Err(IndexError::InvalidFanout { leaf, branch });
        }
        Ok(Self { leaf, branch })
    }

    const fn leaf_max(&self) -> usize {
        2 * self.leaf
    }

    const fn branch_max_keys(&self) -> usize {
        2 * self.branch
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Shape of a tree as reported by [`BPlusTree::check_invariants`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeShape {
    /// Number of levels, zero for an empty tree
    pub depth: usize,
    /// Number of leaves
    pub leaves: usize,
    /// Number of entries over all leaves
    pub entries: usize,
}

/// An ordered index from [`IndexKey`] to [`ChunkAddress`]
#[derive(Debug)]
pub struct BPlusTree<S> {
    store: S,
    key_type: KeyType,
    fanout: Fanout,
    arena: Arena<Node>,
    root: Option<Child>,
    root_hash: ChunkAddress,
    buffered: bool,
}

impl<S: ChunkStore> BPlusTree<S> {
    /// Creates an empty tree with the default fanout
    pub fn new(store: S, key_type: KeyType) -> Self {
        Self::open_with_fanout(store, key_type, ChunkAddress::zero(), Fanout::DEFAULT)
    }

    /// Opens the tree persisted under `root_hash`; zero opens an empty tree
    ///
    /// Nothing is read until the first operation reaches the root.
    pub fn open(store: S, key_type: KeyType, root_hash: ChunkAddress) -> Self {
        Self::open_with_fanout(store, key_type, root_hash, Fanout::DEFAULT)
    }

    /// Opens a tree with explicit node capacities
    ///
    /// `fanout` must be the one the persisted nodes were written with; a
    /// node larger than it allows fails with [`IndexError::FanoutExceeded`].
    pub fn open_with_fanout(
        store: S,
        key_type: KeyType,
        root_hash: ChunkAddress,
        fanout: Fanout,
    ) -> Self {
        Self {
            store,
            key_type,
            fanout,
            arena: Arena::new(),
            root: root_hash.non_zero().map(Child::Stored),
            root_hash,
            buffered: false,
        }
    }

    /// Key ordering of this tree
    pub const fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Node capacities of this tree
    pub const fn fanout(&self) -> Fanout {
        self.fanout
    }

    /// Number of nodes currently held in memory
    pub const fn resident_nodes(&self) -> usize {
        self.arena.len()
    }

    /// Writes every dirty node and returns the new root hash
    ///
    /// Unlike [`Index::flush_buffer`] this leaves the buffering mode alone.
    pub fn flush(&mut self) -> Result<ChunkAddress> {
        let hash = match self.root {
            None => ChunkAddress::zero(),
            Some(Child::Stored(hash)) => hash,
            Some(Child::Loaded(id)) => {
                let mut written = 0;
                let hash = self.persist(id, &mut written)?;
                if written > 0 {
                    debug!(root = %hash, nodes = written, "flushed b+tree");
                }
                hash
            }
        };
        self.root_hash = hash;
        Ok(hash)
    }

    /// Verifies ordering, separator bounds, fill bounds and uniform leaf depth
    ///
    /// Loads the whole tree.
    pub fn check_invariants(&mut self) -> Result<TreeShape> {
        let mut shape = TreeShape::default();
        let Some(root) = self.root_id()? else {
            return Ok(shape);
        };
        let mut leaf_depth = None;
        self.check_node(root, None, None, 1, true, &mut leaf_depth, &mut shape)?;
        shape.depth = leaf_depth.unwrap_or(0);
        Ok(shape)
    }

    fn check_flush(&mut self) -> Result<()> {
        if !self.buffered {
            self.flush()?;
        }
        Ok(())
    }

    fn cmp(&self, a: &IndexKey, b: &IndexKey) -> Ordering {
        self.key_type.compare(a, b)
    }

    /// Position of `key` among `keys`, and whether it was found
    fn find(&self, keys: &[IndexKey], key: &IndexKey) -> (usize, bool) {
        match keys.binary_search_by(|probe| self.cmp(probe, key)) {
            Ok(i) => (i, true),
            Err(i) => (i, false),
        }
    }

    fn find_entry(&self, entries: &[(IndexKey, ChunkAddress)], key: &IndexKey) -> (usize, bool) {
        match entries.binary_search_by(|(probe, _)| self.cmp(probe, key)) {
            Ok(i) => (i, true),
            Err(i) => (i, false),
        }
    }

    /// Child of a branch that may contain `key`
    fn child_index(&self, keys: &[IndexKey], key: &IndexKey) -> usize {
        match self.find(keys, key) {
            (i, true) => i + 1,
            (i, false) => i,
        }
    }

    fn branch(&self, id: NodeId) -> &Branch {
        match &self.arena[id] {
            Node::Branch(branch) => branch,
            Node::Leaf(_) => unreachable!("expected a branch node"),
        }
    }

    fn branch_mut(&mut self, id: NodeId) -> &mut Branch {
        match &mut self.arena[id] {
            Node::Branch(branch) => branch,
            Node::Leaf(_) => unreachable!("expected a branch node"),
        }
    }

    fn leaf(&self, id: NodeId) -> &Leaf {
        match &self.arena[id] {
            Node::Leaf(leaf) => leaf,
            Node::Branch(_) => unreachable!("expected a leaf node"),
        }
    }

    fn leaf_mut(&mut self, id: NodeId) -> &mut Leaf {
        match &mut self.arena[id] {
            Node::Leaf(leaf) => leaf,
            Node::Branch(_) => unreachable!("expected a leaf node"),
        }
    }

    fn leaf_pair_mut(&mut self, a: NodeId, b: NodeId) -> (&mut Leaf, &mut Leaf) {
        match self.arena.pair_mut(a, b) {
            (Node::Leaf(a), Node::Leaf(b)) => (a, b),
            _ => unreachable!("expected two leaf nodes"),
        }
    }

    fn branch_pair_mut(&mut self, a: NodeId, b: NodeId) -> (&mut Branch, &mut Branch) {
        match self.arena.pair_mut(a, b) {
            (Node::Branch(a), Node::Branch(b)) => (a, b),
            _ => unreachable!("expected two branch nodes"),
        }
    }

    fn touch(&mut self, id: NodeId) {
        self.arena[id].mark_dirty();
    }

    fn is_root(&self, id: NodeId) -> bool {
        matches!(self.root, Some(Child::Loaded(root)) if root == id)
    }

    fn load(&mut self, hash: ChunkAddress, expected: Option<NodeKind>) -> Result<NodeId> {
        let chunk = self.store.retrieve(&hash)?;
        let node = node::decode(&chunk, hash)?;
        if let Some(expected) = expected.filter(|kind| *kind != node.kind()) {
            return Err(IndexError::malformed(
                hash,
                format!("expected {expected:?} node, found {:?}", node.kind()),
            ));
        }
        let (entries, max) = match &node {
            Node::Leaf(leaf) => (leaf.entries.len(), self.fanout.leaf_max()),
            Node::Branch(branch) => (branch.children.len(), self.fanout.branch_max_keys() + 2),
        };
        if entries > max {
            return Err(IndexError::FanoutExceeded {
                address: hash,
                entries,
                max,
            });
        }
        trace!(%hash, kind = ?node.kind(), "loaded b+tree node");
        Ok(self.arena.alloc(node))
    }

    fn root_id(&mut self) -> Result<Option<NodeId>> {
        match self.root {
            None => Ok(None),
            Some(Child::Loaded(id)) => Ok(Some(id)),
            Some(Child::Stored(hash)) => {
                let id = self.load(hash, None)?;
                self.root = Some(Child::Loaded(id));
                Ok(Some(id))
            }
        }
    }

    /// Resolves child `i` of `parent`, reading it from the store if needed
    fn load_child(&mut self, parent: NodeId, i: usize) -> Result<NodeId> {
        let branch = self.branch(parent);
        let (child, kind) = (branch.children[i], branch.child_kind);
        match child {
            Child::Loaded(id) => Ok(id),
            Child::Stored(hash) => {
                let id = self.load(hash, Some(kind))?;
                self.branch_mut(parent).children[i] = Child::Loaded(id);
                Ok(id)
            }
        }
    }

    fn persist(&mut self, id: NodeId, written: &mut usize) -> Result<ChunkAddress> {
        if let Some(hash) = self.arena[id].state().hash {
            return Ok(hash);
        }

        let chunk = match &self.arena[id] {
            Node::Leaf(leaf) => node::encode_leaf(&leaf.entries),
            Node::Branch(branch) => {
                let children = branch.children.clone();
                let keys = branch.keys.clone();
                let child_kind = branch.child_kind;
                let mut hashes = Vec::with_capacity(children.len());
                for child in children {
                    hashes.push(match child {
                        Child::Stored(hash) => hash,
                        Child::Loaded(child) => self.persist(child, written)?,
                    });
                }
                node::encode_branch(&keys, &hashes, child_kind)
            }
        };

        let hash = self.store.store(chunk)?;
        self.arena[id].set_stored(hash);
        *written += 1;
        Ok(hash)
    }

    fn upsert(&mut self, key: &IndexKey, value: ChunkAddress, overwrite: bool) -> Result<PutOutcome> {
        let Some(mut q) = self.root_id()? else {
            let leaf = Leaf {
                entries: vec![(*key, value)],
                state: NodeState::default(),
            };
            self.root = Some(Child::Loaded(self.arena.alloc(Node::Leaf(leaf))));
            return Ok(PutOutcome::Inserted);
        };

        let mut path = Vec::new();
        let mut parent: Option<(NodeId, usize)> = None;
        loop {
            if let Node::Branch(branch) = &self.arena[q] {
                let mut i = self.child_index(&branch.keys, key);
                if branch.keys.len() > self.fanout.branch_max_keys() {
                    (q, i) = self.split_branch(parent, q, i);
                }
                path.push(q);
                parent = Some((q, i));
                q = self.load_child(q, i)?;
                continue;
            }

            let (i, found) = self.find_entry(&self.leaf(q).entries, key);
            let outcome = if found {
                if !overwrite {
                    return Err(IndexError::DuplicateKey);
                }
                self.leaf_mut(q).entries[i].1 = value;
                self.touch(q);
                PutOutcome::Updated
            } else {
                if self.leaf(q).entries.len() < self.fanout.leaf_max() {
                    self.leaf_mut(q).entries.insert(i, (*key, value));
                    self.touch(q);
                } else {
                    self.overflow(parent, q, i, (*key, value))?;
                }
                PutOutcome::Inserted
            };

            for id in path {
                self.touch(id);
            }
            return Ok(outcome);
        }
    }

    /// Splits a full branch around its middle separator
    ///
    /// Returns the half that child `i` ended up in and its new index there.
    fn split_branch(
        &mut self,
        parent: Option<(NodeId, usize)>,
        q: NodeId,
        i: usize,
    ) -> (NodeId, usize) {
        let kx = self.fanout.branch;
        let branch = self.branch_mut(q);
        let keys = branch.keys.split_off(kx + 1);
        let children = branch.children.split_off(kx + 1);
        let separator = branch.keys.pop().unwrap_or_default();
        let child_kind = branch.child_kind;
        let r = self.arena.alloc(Node::Branch(Branch {
            keys,
            children,
            child_kind,
            state: NodeState::default(),
        }));
        self.touch(q);
        self.link_split(parent, q, separator, r, NodeKind::Branch);

        if i > kx { (r, i - (kx + 1)) } else { (q, i) }
    }

    /// Hooks `r`, the new right half of `q`, into the parent or a new root
    fn link_split(
        &mut self,
        parent: Option<(NodeId, usize)>,
        q: NodeId,
        separator: IndexKey,
        r: NodeId,
        kind: NodeKind,
    ) {
        match parent {
            Some((p, pi)) => {
                let branch = self.branch_mut(p);
                branch.keys.insert(pi, separator);
                branch.children.insert(pi + 1, Child::Loaded(r));
                self.touch(p);
            }
            None => {
                let root = Branch {
                    keys: vec![separator],
                    children: vec![Child::Loaded(q), Child::Loaded(r)],
                    child_kind: kind,
                    state: NodeState::default(),
                };
                self.root = Some(Child::Loaded(self.arena.alloc(Node::Branch(root))));
            }
        }
    }

    /// Siblings of child `pi` of `p`, loaded
    fn siblings(&mut self, p: NodeId, pi: usize) -> Result<(Option<NodeId>, Option<NodeId>)> {
        let last = self.branch(p).keys.len();
        let left = if pi > 0 { Some(self.load_child(p, pi - 1)?) } else { None };
        let right = if pi < last { Some(self.load_child(p, pi + 1)?) } else { None };
        Ok((left, right))
    }

    /// Inserts into a full leaf via a sibling with room, or by splitting it
    fn overflow(
        &mut self,
        parent: Option<(NodeId, usize)>,
        q: NodeId,
        i: usize,
        entry: (IndexKey, ChunkAddress),
    ) -> Result<()> {
        let max = self.fanout.leaf_max();
        let Some((p, pi)) = parent else {
            self.split_leaf(None, q, i, entry);
            return Ok(());
        };
        let (left, right) = self.siblings(p, pi)?;

        if let Some(l) = left.filter(|l| i != 0 && self.leaf(*l).entries.len() < max) {
            let (ln, qn) = self.leaf_pair_mut(l, q);
            ln.entries.push(qn.entries.remove(0));
            qn.entries.insert(i - 1, entry);
            let first = qn.entries[0].0;
            self.branch_mut(p).keys[pi - 1] = first;
            self.touch(l);
            self.touch(q);
            self.touch(p);
            return Ok(());
        }

        if let Some(r) = right.filter(|r| self.leaf(*r).entries.len() < max) {
            let (qn, rn) = self.leaf_pair_mut(q, r);
            if i < qn.entries.len() {
                let last = qn.entries.pop().unwrap_or(entry);
                rn.entries.insert(0, last);
                qn.entries.insert(i, entry);
            } else {
                rn.entries.insert(0, entry);
            }
            let first = rn.entries[0].0;
            self.branch_mut(p).keys[pi] = first;
            self.touch(q);
            self.touch(r);
            self.touch(p);
            return Ok(());
        }

        self.split_leaf(Some((p, pi)), q, i, entry);
        Ok(())
    }

    fn split_leaf(
        &mut self,
        parent: Option<(NodeId, usize)>,
        q: NodeId,
        i: usize,
        entry: (IndexKey, ChunkAddress),
    ) {
        let kd = self.fanout.leaf;
        let upper = self.leaf_mut(q).entries.split_off(kd);
        let r = self.arena.alloc(Node::Leaf(Leaf {
            entries: upper,
            state: NodeState::default(),
        }));
        let separator = self.leaf(r).entries[0].0;
        self.link_split(parent, q, separator, r, NodeKind::Leaf);

        if i > kd {
            self.leaf_mut(r).entries.insert(i - kd, entry);
        } else {
            self.leaf_mut(q).entries.insert(i, entry);
        }
        self.touch(q);
    }

    fn remove(&mut self, key: &IndexKey) -> Result<bool> {
        let Some(mut q) = self.root_id()? else {
            return Ok(false);
        };

        let mut path = Vec::new();
        let mut parent: Option<(NodeId, usize)> = None;
        loop {
            if let Node::Branch(branch) = &self.arena[q] {
                let mut i = self.child_index(&branch.keys, key);
                if branch.keys.len() < self.fanout.branch && !self.is_root(q) {
                    if let Some(p) = parent {
                        (q, i) = self.underflow_branch(p, q, i)?;
                    }
                }
                path.push(q);
                parent = Some((q, i));
                q = self.load_child(q, i)?;
                continue;
            }

            let (i, found) = self.find_entry(&self.leaf(q).entries, key);
            if !found {
                return Ok(false);
            }
            self.leaf_mut(q).entries.remove(i);
            self.touch(q);
            for id in path {
                if self.arena.get(id).is_some() {
                    self.touch(id);
                }
            }

            let remaining = self.leaf(q).entries.len();
            if self.is_root(q) {
                if remaining == 0 {
                    self.arena.remove(q);
                    self.root = None;
                }
            } else if remaining < self.fanout.leaf {
                if let Some(p) = parent {
                    self.underflow_leaf(p, q)?;
                }
            }
            return Ok(true);
        }
    }

    /// Refills a thin leaf from a sibling, or merges it into one
    fn underflow_leaf(&mut self, (p, pi): (NodeId, usize), q: NodeId) -> Result<()> {
        let max = self.fanout.leaf_max();
        let (left, right) = self.siblings(p, pi)?;
        let q_len = self.leaf(q).entries.len();

        if let Some(l) = left.filter(|l| self.leaf(*l).entries.len() + q_len >= max) {
            let (ln, qn) = self.leaf_pair_mut(l, q);
            if let Some(moved) = ln.entries.pop() {
                qn.entries.insert(0, moved);
            }
            let first = qn.entries[0].0;
            self.branch_mut(p).keys[pi - 1] = first;
            self.touch(l);
            self.touch(q);
            self.touch(p);
            return Ok(());
        }

        if let Some(r) = right.filter(|r| q_len + self.leaf(*r).entries.len() >= max) {
            let (qn, rn) = self.leaf_pair_mut(q, r);
            qn.entries.push(rn.entries.remove(0));
            let first = rn.entries[0].0;
            self.branch_mut(p).keys[pi] = first;
            self.touch(q);
            self.touch(r);
            self.touch(p);
            return Ok(());
        }

        match (left, right) {
            (Some(l), _) => self.merge_leaves(p, l, q, pi - 1),
            (None, Some(r)) => self.merge_leaves(p, q, r, pi),
            (None, None) => Err(IndexError::InvariantViolated(
                "branch with a single child".into(),
            )),
        }
    }

    /// Moves all of `r` into `q`; `q` is child `pi` of `p`, `r` child `pi + 1`
    fn merge_leaves(&mut self, p: NodeId, q: NodeId, r: NodeId, pi: usize) -> Result<()> {
        if let Some(Node::Leaf(right)) = self.arena.remove(r) {
            self.leaf_mut(q).entries.extend(right.entries);
        }
        self.touch(q);
        self.unlink_merged(p, q, pi);
        Ok(())
    }

    /// Drops the separator between children `pi` and `pi + 1` of `p`
    fn unlink_merged(&mut self, p: NodeId, q: NodeId, pi: usize) {
        if self.branch(p).keys.len() > 1 || !self.is_root(p) {
            let branch = self.branch_mut(p);
            branch.keys.remove(pi);
            branch.children.remove(pi + 1);
            branch.children[pi] = Child::Loaded(q);
            self.touch(p);
        } else {
            self.arena.remove(p);
            self.root = Some(Child::Loaded(q));
        }
    }

    /// Refills a thin branch by rotating through the parent, or merges it
    ///
    /// Returns the branch that now holds the subtree formerly at child `i`
    /// of `q`, with its index there.
    fn underflow_branch(
        &mut self,
        (p, pi): (NodeId, usize),
        q: NodeId,
        mut i: usize,
    ) -> Result<(NodeId, usize)> {
        let kx = self.fanout.branch;
        let (left, right) = self.siblings(p, pi)?;

        if let Some(l) = left.filter(|l| self.branch(*l).keys.len() > kx) {
            let down = self.branch(p).keys[pi - 1];
            let (ln, qn) = self.branch_pair_mut(l, q);
            let (Some(up), Some(child)) = (ln.keys.pop(), ln.children.pop()) else {
                return Err(IndexError::InvariantViolated("empty left branch".into()));
            };
            qn.keys.insert(0, down);
            qn.children.insert(0, child);
            self.branch_mut(p).keys[pi - 1] = up;
            self.touch(l);
            self.touch(q);
            self.touch(p);
            return Ok((q, i + 1));
        }

        if let Some(r) = right.filter(|r| self.branch(*r).keys.len() > kx) {
            let down = self.branch(p).keys[pi];
            let (qn, rn) = self.branch_pair_mut(q, r);
            qn.keys.push(down);
            qn.children.push(rn.children.remove(0));
            let up = rn.keys.remove(0);
            self.branch_mut(p).keys[pi] = up;
            self.touch(q);
            self.touch(r);
            self.touch(p);
            return Ok((q, i));
        }

        match (left, right) {
            (Some(l), _) => {
                i += self.branch(l).keys.len() + 1;
                self.merge_branches(p, l, q, pi - 1);
                Ok((l, i))
            }
            (None, Some(r)) => {
                self.merge_branches(p, q, r, pi);
                Ok((q, i))
            }
            (None, None) => Err(IndexError::InvariantViolated(
                "branch with a single child".into(),
            )),
        }
    }

    fn merge_branches(&mut self, p: NodeId, q: NodeId, r: NodeId, pi: usize) {
        let down = self.branch(p).keys[pi];
        if let Some(Node::Branch(right)) = self.arena.remove(r) {
            let branch = self.branch_mut(q);
            branch.keys.push(down);
            branch.keys.extend(right.keys);
            branch.children.extend(right.children);
        }
        self.touch(q);
        self.unlink_merged(p, q, pi);
    }

    /// Descends to the leaf that holds or would hold `key`
    ///
    /// Returns the branch path with child indexes, the leaf, and the
    /// position of `key` in it.
    fn locate(&mut self, key: &IndexKey) -> Result<Option<(Vec<(NodeId, usize)>, NodeId, usize, bool)>> {
        let Some(mut q) = self.root_id()? else {
            return Ok(None);
        };
        let mut path = Vec::new();
        loop {
            if let Node::Branch(branch) = &self.arena[q] {
                let i = self.child_index(&branch.keys, key);
                path.push((q, i));
                q = self.load_child(q, i)?;
                continue;
            }
            let (i, found) = self.find_entry(&self.leaf(q).entries, key);
            return Ok(Some((path, q, i, found)));
        }
    }

    /// Descends along the first or last child of every branch
    fn descend_edge(&mut self, mut q: NodeId, path: &mut Vec<(NodeId, usize)>, last: bool) -> Result<NodeId> {
        while let Node::Branch(branch) = &self.arena[q] {
            let i = if last { branch.children.len() - 1 } else { 0 };
            path.push((q, i));
            q = self.load_child(q, i)?;
        }
        Ok(q)
    }

    #[allow(clippy::too_many_arguments)]
    fn check_node(
        &mut self,
        id: NodeId,
        lower: Option<IndexKey>,
        upper: Option<IndexKey>,
        depth: usize,
        is_root: bool,
        leaf_depth: &mut Option<usize>,
        shape: &mut TreeShape,
    ) -> Result<()> {
        let in_bounds = |tree: &Self, key: &IndexKey| {
            lower.is_none_or(|lo| tree.cmp(&lo, key) != Ordering::Greater)
                && upper.is_none_or(|hi| tree.cmp(key, &hi) == Ordering::Less)
        };
        let violation = |message: String| Err(IndexError::InvariantViolated(message));

        if let Node::Leaf(leaf) = &self.arena[id] {
            let len = leaf.entries.len();
            if !is_root && !(self.fanout.leaf..=self.fanout.leaf_max()).contains(&len) {
                return violation(format!("leaf with {len} entries at depth {depth}"));
            }
            if leaf.entries.windows(2).any(|w| self.cmp(&w[0].0, &w[1].0) != Ordering::Less) {
                return violation(format!("unsorted leaf at depth {depth}"));
            }
            if let Some((key, _)) = leaf.entries.iter().find(|(key, _)| !in_bounds(self, key)) {
                return violation(format!("{key:?} outside its separators"));
            }
            match *leaf_depth {
                Some(expected) if expected != depth => {
                    return violation(format!("leaves at depths {expected} and {depth}"));
                }
                _ => *leaf_depth = Some(depth),
            }
            shape.leaves += 1;
            shape.entries += len;
            return Ok(());
        }

        let branch = self.branch(id);
        let keys = branch.keys.clone();
        let children = branch.children.len();
        let min = if is_root { 2 } else { self.fanout.branch };
        if !(min..=self.fanout.branch_max_keys() + 2).contains(&children) || children != keys.len() + 1 {
            return violation(format!("branch with {children} children at depth {depth}"));
        }
        if keys.windows(2).any(|w| self.cmp(&w[0], &w[1]) != Ordering::Less) {
            return violation(format!("unsorted branch at depth {depth}"));
        }
        if let Some(key) = keys.iter().find(|key| !in_bounds(self, key)) {
            return violation(format!("separator {key:?} outside its bounds"));
        }

        for i in 0..children {
            let child = self.load_child(id, i)?;
            let lo = if i == 0 { lower } else { Some(keys[i - 1]) };
            let hi = keys.get(i).copied().or(upper);
            self.check_node(child, lo, hi, depth + 1, false, leaf_depth, shape)?;
        }
        Ok(())
    }
}

impl<S: ChunkStore> Index for BPlusTree<S> {
    fn get(&mut self, key: &IndexKey) -> Result<Option<ChunkAddress>> {
        Ok(self
            .locate(key)?
            .and_then(|(_, leaf, i, found)| found.then(|| self.leaf(leaf).entries[i].1)))
    }

    fn put(&mut self, key: &IndexKey, value: ChunkAddress) -> Result<PutOutcome> {
        let outcome = self.upsert(key, value, true)?;
        trace!(?key, ?outcome, "b+tree put");
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
            trace!(?key, "b+tree delete");
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
        self.root = self.root_hash.non_zero().map(Child::Stored);
        self.buffered = false;
        debug!(root = %self.root_hash, "discarded buffered b+tree changes");
        Ok(())
    }

    fn is_buffered(&self) -> bool {
        self.buffered
    }

    fn root_hash(&self) -> ChunkAddress {
        self.root_hash
    }
}

impl<S: ChunkStore> OrderedIndex for BPlusTree<S> {
    type Cursor<'a>
        = Cursor<'a, S>
    where
        Self: 'a;

    fn seek(&mut self, key: &IndexKey) -> Result<(Cursor<'_, S>, bool)> {
        Ok(match self.locate(key)? {
            Some((path, leaf, pos, found)) => (Cursor::at(self, path, leaf, pos, found), found),
            None => (Cursor::exhausted(self), false),
        })
    }

    fn seek_first(&mut self) -> Result<Cursor<'_, S>> {
        let Some(root) = self.root_id()? else {
            return Ok(Cursor::exhausted(self));
        };
        let mut path = Vec::new();
        let leaf = self.descend_edge(root, &mut path, false)?;
        Ok(Cursor::at(self, path, leaf, 0, true))
    }

    fn seek_last(&mut self) -> Result<Cursor<'_, S>> {
        let Some(root) = self.root_id()? else {
            return Ok(Cursor::exhausted(self));
        };
        let mut path = Vec::new();
        let leaf = self.descend_edge(root, &mut path, true)?;
        let pos = self.leaf(leaf).entries.len().saturating_sub(1);
        Ok(Cursor::at(self, path, leaf, pos, true))
    }
}

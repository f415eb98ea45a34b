//! B+tree nodes and their chunk layout.
//!
//! ```text
//! offset              contents
//! 0 .. 64*n           n entries of 64 bytes: 32-byte key, 32-byte hash
//! 4096-67             entry count
//! 4096-66             child tag: 'X' branch children, 'D' leaf children, 'C' leaf
//! 4096-65             node tag:  'X' branch, 'D' leaf
//! 4096-64 .. 4096-32  leaf: previous sibling (reserved, zero)
//! 4096-32 .. 4096     leaf: next sibling (reserved, zero)
//! ```
//!
//! A branch with `c` separators has `c + 1` entries; the key slot of the
//! last entry is zero. A leaf entry's hash is the value stored under its key.
//!
//! The sibling slots are always written as zero and ignored on decode. A
//! leaf's hash depends on its bytes, so it cannot name a neighbour that in
//! turn names it; cursors reach the adjacent leaf through the branch path
//! instead.

use comb_primitives::{CHUNK_SIZE, Chunk, ChunkAddress};

use crate::{IndexError, IndexKey, KEY_SIZE, Result, arena::NodeId};

/// Bytes per packed entry
pub(crate) const ENTRY_SIZE: usize = 64;

const COUNT_OFFSET: usize = CHUNK_SIZE - 67;
const CHILD_TAG_OFFSET: usize = CHUNK_SIZE - 66;
const NODE_TAG_OFFSET: usize = CHUNK_SIZE - 65;

/// Most entries that fit before the trailer
pub(crate) const MAX_ENTRIES: usize = COUNT_OFFSET / ENTRY_SIZE;

const BRANCH_TAG: u8 = b'X';
const LEAF_TAG: u8 = b'D';
const VALUE_TAG: u8 = b'C';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Branch,
    Leaf,
}

impl NodeKind {
    const fn tag(self) -> u8 {
        match self {
            Self::Branch => BRANCH_TAG,
            Self::Leaf => LEAF_TAG,
        }
    }
}

/// Reference from a branch to one of its children
#[derive(Debug, Clone, Copy)]
pub(crate) enum Child {
    /// Persisted and not yet read
    Stored(ChunkAddress),
    /// Resident in the tree's arena
    Loaded(NodeId),
}

/// Persistence state shared by both node kinds
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NodeState {
    /// Address of the chunk holding the current contents, if persisted
    pub(crate) hash: Option<ChunkAddress>,
}

impl NodeState {
    pub(crate) const fn stored(hash: ChunkAddress) -> Self {
        Self { hash: Some(hash) }
    }
}

#[derive(Debug)]
pub(crate) struct Branch {
    pub(crate) keys: Vec<IndexKey>,
    pub(crate) children: Vec<Child>,
    pub(crate) child_kind: NodeKind,
    pub(crate) state: NodeState,
}

#[derive(Debug, Default)]
pub(crate) struct Leaf {
    pub(crate) entries: Vec<(IndexKey, ChunkAddress)>,
    pub(crate) state: NodeState,
}

#[derive(Debug)]
pub(crate) enum Node {
    Branch(Branch),
    Leaf(Leaf),
}

impl Node {
    pub(crate) const fn kind(&self) -> NodeKind {
        match self {
            Self::Branch(_) => NodeKind::Branch,
            Self::Leaf(_) => NodeKind::Leaf,
        }
    }

    pub(crate) const fn state(&self) -> &NodeState {
        match self {
            Self::Branch(branch) => &branch.state,
            Self::Leaf(leaf) => &leaf.state,
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        match self {
            Self::Branch(branch) => branch.state.hash = None,
            Self::Leaf(leaf) => leaf.state.hash = None,
        }
    }

    pub(crate) fn set_stored(&mut self, hash: ChunkAddress) {
        match self {
            Self::Branch(branch) => branch.state = NodeState::stored(hash),
            Self::Leaf(leaf) => leaf.state = NodeState::stored(hash),
        }
    }
}

fn write_entry(buf: &mut [u8], i: usize, key: &IndexKey, hash: &ChunkAddress) {
    let at = i * ENTRY_SIZE;
    buf[at..at + KEY_SIZE].copy_from_slice(key.as_bytes());
    buf[at + KEY_SIZE..at + ENTRY_SIZE].copy_from_slice(hash.as_bytes());
}

fn read_entry(buf: &[u8], i: usize) -> (IndexKey, ChunkAddress) {
    let at = i * ENTRY_SIZE;
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&buf[at..at + KEY_SIZE]);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&buf[at + KEY_SIZE..at + ENTRY_SIZE]);
    (IndexKey::new(key), ChunkAddress::new(hash))
}

pub(crate) fn encode_leaf(entries: &[(IndexKey, ChunkAddress)]) -> Chunk {
    let mut buf = [0u8; CHUNK_SIZE];
    for (i, (key, value)) in entries.iter().enumerate() {
        write_entry(&mut buf, i, key, value);
    }
    buf[COUNT_OFFSET] = entries.len() as u8;
    buf[CHILD_TAG_OFFSET] = VALUE_TAG;
    buf[NODE_TAG_OFFSET] = LEAF_TAG;
    Chunk::from_array(buf)
}

pub(crate) fn encode_branch(keys: &[IndexKey], children: &[ChunkAddress], child_kind: NodeKind) -> Chunk {
    debug_assert_eq!(keys.len() + 1, children.len());
    let mut buf = [0u8; CHUNK_SIZE];
    for (i, child) in children.iter().enumerate() {
        let key = keys.get(i).unwrap_or(&IndexKey::ZERO);
        write_entry(&mut buf, i, key, child);
    }
    buf[COUNT_OFFSET] = children.len() as u8;
    buf[CHILD_TAG_OFFSET] = child_kind.tag();
    buf[NODE_TAG_OFFSET] = BRANCH_TAG;
    Chunk::from_array(buf)
}

pub(crate) fn decode(chunk: &Chunk, address: ChunkAddress) -> Result<Node> {
    let buf = chunk.data();
    let count = buf[COUNT_OFFSET] as usize;
    if count > MAX_ENTRIES {
        return Err(IndexError::malformed(address, format!("entry count {count}")));
    }

    match buf[NODE_TAG_OFFSET] {
        LEAF_TAG => {
            if buf[CHILD_TAG_OFFSET] != VALUE_TAG {
                return Err(IndexError::malformed(address, "leaf without value tag"));
            }
            let entries = (0..count).map(|i| read_entry(buf, i)).collect();
            Ok(Node::Leaf(Leaf {
                entries,
                state: NodeState::stored(address),
            }))
        }
        BRANCH_TAG => {
            let child_kind = match buf[CHILD_TAG_OFFSET] {
                BRANCH_TAG => NodeKind::Branch,
                LEAF_TAG => NodeKind::Leaf,
                tag => {
                    return Err(IndexError::malformed(address, format!("child tag {tag:#04x}")));
                }
            };
            if count < 2 {
                return Err(IndexError::malformed(address, "branch with fewer than two children"));
            }
            let mut keys = Vec::with_capacity(count - 1);
            let mut children = Vec::with_capacity(count);
            for i in 0..count {
                let (key, child) = read_entry(buf, i);
                if child.is_zero() {
                    return Err(IndexError::malformed(address, format!("empty child slot {i}")));
                }
                if i + 1 < count {
                    keys.push(key);
                }
                children.push(Child::Stored(child));
            }
            Ok(Node::Branch(Branch {
                keys,
                children,
                child_kind,
                state: NodeState::stored(address),
            }))
        }
        tag => Err(IndexError::malformed(address, format!("node tag {tag:#04x}"))),
    }
}

//! Hash-trie nodes, bin selection and chunk layout.
//!
//! ```text
//! branch                              leaf
//! 0 .. 8      kind, u64 LE = 1        0 .. 8      kind, u64 LE = 0
//! 8 .. 16     level, u64 LE           64 .. 96    value
//! 64 + 32*i   hash of bin i (0..64)   96 .. 128   key slot
//! ```
//!
//! An empty bin is an all-zero hash.

use alloy_primitives::B256;
use byteorder::{ByteOrder, LittleEndian};
use comb_primitives::{CHUNK_SIZE, Chunk, ChunkAddress};
use digest::Digest;
use sha3::Sha3_256;

use crate::{IndexError, IndexKey, KEY_SIZE, Result, arena::NodeId};

/// Children per branch
pub(crate) const BINS: usize = 64;

/// Deepest level whose 6-bit window starts inside a 256-bit hash
pub(crate) const MAX_LEVEL: usize = 42;

const KIND_BRANCH: u64 = 1;
const KIND_LEAF: u64 = 0;
const BINS_OFFSET: usize = 64;
const VALUE_OFFSET: usize = 64;
const KEY_OFFSET: usize = 96;

/// SHA3-256 of a key slot
pub(crate) fn key_hash(key: &IndexKey) -> B256 {
    B256::from_slice(&Sha3_256::digest(key.as_bytes()))
}

/// The 6-bit window of `hash` starting at bit `6 * level`
pub(crate) fn bin(hash: &B256, level: usize) -> usize {
    let bit = level * 6;
    let (byte, shift) = (bit / 8, bit % 8);
    let hi = u16::from(hash[byte]);
    let lo = u16::from(hash.get(byte + 1).copied().unwrap_or(0));
    usize::from(((hi << 8 | lo) >> (10 - shift)) & 0x3f)
}

/// First level at or after `from` where the two hashes select different bins
pub(crate) fn divergence(a: &B256, b: &B256, from: usize) -> Option<usize> {
    (from..=MAX_LEVEL).find(|level| bin(a, *level) != bin(b, *level))
}

/// Reference from a branch bin to a child
#[derive(Debug, Clone, Copy)]
pub(crate) enum Slot {
    Stored(ChunkAddress),
    Loaded(NodeId),
}

#[derive(Debug)]
pub(crate) struct TrieBranch {
    pub(crate) level: usize,
    pub(crate) bins: Box<[Option<Slot>; BINS]>,
    pub(crate) hash: Option<ChunkAddress>,
}

impl TrieBranch {
    pub(crate) fn new(level: usize) -> Self {
        Self {
            level,
            bins: Box::new([None; BINS]),
            hash: None,
        }
    }

    pub(crate) fn occupied(&self) -> impl Iterator<Item = (usize, Slot)> + '_ {
        self.bins
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|slot| (i, slot)))
    }
}

#[derive(Debug)]
pub(crate) struct TrieLeaf {
    pub(crate) key: IndexKey,
    pub(crate) key_hash: B256,
    pub(crate) value: ChunkAddress,
    pub(crate) hash: Option<ChunkAddress>,
}

impl TrieLeaf {
    pub(crate) fn new(key: IndexKey, value: ChunkAddress) -> Self {
        Self {
            key,
            key_hash: key_hash(&key),
            value,
            hash: None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum TrieNode {
    Branch(TrieBranch),
    Leaf(TrieLeaf),
}

impl TrieNode {
    pub(crate) const fn hash(&self) -> Option<ChunkAddress> {
        match self {
            Self::Branch(branch) => branch.hash,
            Self::Leaf(leaf) => leaf.hash,
        }
    }

    pub(crate) fn set_hash(&mut self, hash: Option<ChunkAddress>) {
        match self {
            Self::Branch(branch) => branch.hash = hash,
            Self::Leaf(leaf) => leaf.hash = hash,
        }
    }

    pub(crate) const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }
}

pub(crate) fn encode_leaf(leaf: &TrieLeaf) -> Chunk {
    let mut buf = [0u8; CHUNK_SIZE];
    LittleEndian::write_u64(&mut buf[..8], KIND_LEAF);
    buf[VALUE_OFFSET..VALUE_OFFSET + 32].copy_from_slice(leaf.value.as_bytes());
    buf[KEY_OFFSET..KEY_OFFSET + KEY_SIZE].copy_from_slice(leaf.key.as_bytes());
    Chunk::from_array(buf)
}

pub(crate) fn encode_branch(level: usize, bins: &[ChunkAddress; BINS]) -> Chunk {
    let mut buf = [0u8; CHUNK_SIZE];
    LittleEndian::write_u64(&mut buf[..8], KIND_BRANCH);
    LittleEndian::write_u64(&mut buf[8..16], level as u64);
    for (i, hash) in bins.iter().enumerate() {
        let at = BINS_OFFSET + i * 32;
        buf[at..at + 32].copy_from_slice(hash.as_bytes());
    }
    Chunk::from_array(buf)
}

pub(crate) fn decode(chunk: &Chunk, address: ChunkAddress) -> Result<TrieNode> {
    let buf = chunk.data();
    match LittleEndian::read_u64(&buf[..8]) {
        KIND_BRANCH => {
            let level = LittleEndian::read_u64(&buf[8..16]) as usize;
            if level > MAX_LEVEL {
                return Err(IndexError::malformed(address, format!("trie level {level}")));
            }
            let mut branch = TrieBranch::new(level);
            for (i, slot) in branch.bins.iter_mut().enumerate() {
                let at = BINS_OFFSET + i * 32;
                let hash = ChunkAddress::from_slice(&buf[at..at + 32])?;
                *slot = hash.non_zero().map(Slot::Stored);
            }
            branch.hash = Some(address);
            Ok(TrieNode::Branch(branch))
        }
        KIND_LEAF => {
            let value = ChunkAddress::from_slice(&buf[VALUE_OFFSET..VALUE_OFFSET + 32])?;
            let key = IndexKey::from_slice(&buf[KEY_OFFSET..KEY_OFFSET + KEY_SIZE])?;
            let mut leaf = TrieLeaf::new(key, value);
            leaf.hash = Some(address);
            Ok(TrieNode::Leaf(leaf))
        }
        kind => Err(IndexError::malformed(address, format!("trie node kind {kind}"))),
    }
}

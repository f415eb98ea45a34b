//! Chunk address implementation
//!
//! This module provides the [`ChunkAddress`] type, the 32-byte content address
//! under which every chunk is stored. Index nodes are addressed by the
//! keccak-256 of their bytes; row payloads are addressed by a SHA-256 over
//! the identity of the row (see [`ChunkAddress::sha256_of`]).
//!
//! ## Example Usage
//!
//! ```
//! use comb_primitives::ChunkAddress;
//!
//! let node = ChunkAddress::keccak(b"node bytes");
//! let row = ChunkAddress::sha256_of(&[b"owner", b"table", b"key"]);
//!
//! assert_ne!(node, row);
//! assert!(!row.is_zero());
//! assert!(ChunkAddress::zero().is_zero());
//! ```

use std::fmt;
use std::ops::Deref;

use alloy_primitives::{B256, hex, keccak256};
use digest::Digest;
use sha2::Sha256;

use crate::error::Result;

/// Length of an address in bytes
pub const ADDRESS_LENGTH: usize = 32;

/// A 256-bit content address of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChunkAddress(pub B256);

impl ChunkAddress {
    /// Creates a new address from raw bytes
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(B256::new(bytes))
    }

    /// Returns the underlying bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Creates a new address from a slice, checking the length
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let address = B256::try_from(slice)?;
        Ok(Self(address))
    }

    /// Checks if this address is zeros
    ///
    /// The zero address marks an empty slot in every on-chunk layout.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Create a new zero-filled address
    pub const fn zero() -> Self {
        Self(B256::ZERO)
    }

    /// Keccak-256 of `data`, the address of an index node chunk
    pub fn keccak(data: &[u8]) -> Self {
        Self(keccak256(data))
    }

    /// SHA-256 over the concatenation of `parts`
    pub fn sha256_of(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(B256::from_slice(&hasher.finalize()))
    }

    /// Returns `None` for the zero address, `Some(self)` otherwise
    pub fn non_zero(self) -> Option<Self> {
        (!self.is_zero()).then_some(self)
    }
}

impl Default for ChunkAddress {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for ChunkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0.as_slice()[..8]))
    }
}

impl fmt::LowerHex for ChunkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Deref for ChunkAddress {
    type Target = B256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<B256> for ChunkAddress {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl From<[u8; 32]> for ChunkAddress {
    fn from(bytes: [u8; 32]) -> Self {
        Self::new(bytes)
    }
}

impl From<ChunkAddress> for B256 {
    fn from(addr: ChunkAddress) -> Self {
        addr.0
    }
}

impl AsRef<[u8]> for ChunkAddress {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;

    #[test]
    fn test_sha256_known_vector() {
        // sha256("abc")
        let addr = ChunkAddress::sha256_of(&[b"a", b"bc"]);
        assert_eq!(
            addr.0,
            b256!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            ChunkAddress::keccak(&[]).0,
            b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
        );
    }

    #[test]
    fn test_display_is_short_hex() {
        let addr = ChunkAddress::from(b256!(
            "0102030405060708000000000000000000000000000000000000000000000000"
        ));
        assert_eq!(addr.to_string(), "0102030405060708");
    }

    #[test]
    fn test_from_slice_length_checked() {
        assert!(ChunkAddress::from_slice(&[0u8; 31]).is_err());
        assert!(ChunkAddress::from_slice(&[0u8; 32]).unwrap().is_zero());
        assert_eq!(ChunkAddress::zero().non_zero(), None);
    }
}

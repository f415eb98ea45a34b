//! Fixed-size chunks
//!
//! A [`Chunk`] is an immutable block of exactly [`CHUNK_SIZE`] bytes. Shorter
//! input is zero padded; longer input is rejected. The content address is
//! the keccak-256 of the full padded block and is computed at most once.
//!
//! ```
//! use comb_primitives::{Chunk, CHUNK_SIZE};
//!
//! let chunk = Chunk::new(&b"hello"[..]).unwrap();
//! assert_eq!(chunk.data().len(), CHUNK_SIZE);
//! assert_eq!(&chunk.data()[..5], b"hello");
//! assert_eq!(chunk.address(), Chunk::new(&b"hello"[..]).unwrap().address());
//! ```

use std::sync::OnceLock;

use bytes::{Bytes, BytesMut};

use crate::{ChunkAddress, StoreError, error::Result};

/// Size of every chunk in bytes
pub const CHUNK_SIZE: usize = 4096;

/// An immutable, zero-padded block of [`CHUNK_SIZE`] bytes
#[derive(Debug, Clone)]
pub struct Chunk {
    data: Bytes,
    address: OnceLock<ChunkAddress>,
}

impl Chunk {
    /// Builds a chunk from `data`, padding with zeros up to [`CHUNK_SIZE`]
    pub fn new(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() > CHUNK_SIZE {
            return Err(StoreError::invalid_size("chunk data", CHUNK_SIZE, data.len()));
        }

        let data = if data.len() == CHUNK_SIZE {
            data
        } else {
            let mut padded = BytesMut::zeroed(CHUNK_SIZE);
            padded[..data.len()].copy_from_slice(&data);
            padded.freeze()
        };

        Ok(Self {
            data,
            address: OnceLock::new(),
        })
    }

    /// Builds a chunk from a full-size buffer
    pub fn from_array(data: [u8; CHUNK_SIZE]) -> Self {
        Self {
            data: Bytes::copy_from_slice(&data),
            address: OnceLock::new(),
        }
    }

    /// The chunk bytes, always [`CHUNK_SIZE`] long
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the chunk and returns its bytes
    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// Content address of the chunk
    pub fn address(&self) -> ChunkAddress {
        *self.address.get_or_init(|| ChunkAddress::keccak(&self.data))
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Chunk {}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_data_is_padded() {
        let chunk = Chunk::new(vec![1u8, 2, 3]).unwrap();
        assert_eq!(chunk.data().len(), CHUNK_SIZE);
        assert!(chunk.data()[3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_oversized_data_rejected() {
        let err = Chunk::new(vec![0u8; CHUNK_SIZE + 1]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidChunkSize {
                actual: 4097,
                max: CHUNK_SIZE,
                ..
            }
        ));
    }

    #[test]
    fn test_padding_does_not_change_address() {
        let short = Chunk::new(vec![7u8; 10]).unwrap();
        let mut full = [0u8; CHUNK_SIZE];
        full[..10].fill(7);
        assert_eq!(short.address(), Chunk::from_array(full).address());
        assert_eq!(short, Chunk::from_array(full));
    }

    #[test]
    fn test_clone_keeps_address() {
        let chunk = Chunk::new(vec![9u8; 64]).unwrap();
        let address = chunk.address();
        let copy = chunk.clone();
        assert_eq!(copy.address.get(), Some(&address));
        assert_eq!(copy.address(), address);
    }
}

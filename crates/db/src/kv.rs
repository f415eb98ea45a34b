//! Row payload chunks.
//!
//! Each row of a table lives in one chunk, identified by the content
//! address `sha256(owner ++ table ++ key)`:
//!
//! ```text
//! offset        contents
//! 0 .. 32       owner, zero padded
//! 32 .. 64      table name, zero padded
//! 64 .. 96      primary key slot
//! 96 .. 128     content address
//! 128           'K'
//! 129           1 if the payload is encrypted
//! 130 .. 134    payload length, u32 big-endian
//! 512 ..        payload
//! ```
//!
//! The chunk itself is stored under its own hash, which the primary index
//! keeps as the key's value. Reading a row re-derives the content address
//! from the key and checks it against the header, so a stale or foreign
//! chunk is reported instead of returned.

use byteorder::{BigEndian, ByteOrder};
use comb_index::IndexKey;
use comb_primitives::{CHUNK_SIZE, Chunk, ChunkAddress, ChunkStore};
use tracing::trace;

use crate::{DbError, Result, descriptor::MAX_NAME};

/// Offset of the payload within a row chunk
pub const PAYLOAD_OFFSET: usize = 512;

/// Largest payload a row chunk holds
pub const MAX_PAYLOAD: usize = CHUNK_SIZE - PAYLOAD_OFFSET;

const KEY_OFFSET: usize = 64;
const ADDRESS_OFFSET: usize = 96;
const TAG_OFFSET: usize = 128;
const ENCRYPTED_OFFSET: usize = 129;
const LENGTH_OFFSET: usize = 130;
const ROW_TAG: u8 = b'K';

/// A payload read back from its chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Payload bytes as stored
    pub payload: Vec<u8>,
    /// Whether the writer marked the payload encrypted
    pub encrypted: bool,
}

/// Key-value payload store for one table
#[derive(Debug, Clone)]
pub struct KeyValueStore<S> {
    store: S,
    owner: String,
    table: String,
    min_payload_len: usize,
}

impl<S: ChunkStore> KeyValueStore<S> {
    /// Creates the payload store of `owner`'s `table`
    pub fn new(store: S, owner: impl Into<String>, table: impl Into<String>, min_payload_len: usize) -> Self {
        Self {
            store,
            owner: owner.into(),
            table: table.into(),
            min_payload_len,
        }
    }

    /// The content address of the row stored under `key`
    pub fn content_address(&self, key: &IndexKey) -> ChunkAddress {
        ChunkAddress::sha256_of(&[self.owner.as_bytes(), self.table.as_bytes(), key.as_bytes()])
    }

    /// Checks a payload against the size limits without writing anything
    pub fn check_payload(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD {
            return Err(DbError::ValueSizeExceeded {
                size: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        if payload.len() < self.min_payload_len {
            return Err(DbError::ValueTooSmall {
                size: payload.len(),
                min: self.min_payload_len,
            });
        }
        Ok(())
    }

    /// Writes `payload` for `key` and returns the chunk's storage hash
    pub fn put(&self, key: &IndexKey, payload: &[u8], encrypted: bool) -> Result<ChunkAddress> {
        self.check_payload(payload)?;

        let mut buf = [0u8; CHUNK_SIZE];
        let owner = self.owner.as_bytes();
        let table = self.table.as_bytes();
        if owner.len() > MAX_NAME || table.len() > MAX_NAME {
            return Err(DbError::invalid_schema("owner or table name longer than 32 bytes"));
        }
        buf[..owner.len()].copy_from_slice(owner);
        buf[MAX_NAME..MAX_NAME + table.len()].copy_from_slice(table);
        buf[KEY_OFFSET..KEY_OFFSET + 32].copy_from_slice(key.as_bytes());
        buf[ADDRESS_OFFSET..ADDRESS_OFFSET + 32].copy_from_slice(self.content_address(key).as_bytes());
        buf[TAG_OFFSET] = ROW_TAG;
        buf[ENCRYPTED_OFFSET] = u8::from(encrypted);
        BigEndian::write_u32(&mut buf[LENGTH_OFFSET..LENGTH_OFFSET + 4], payload.len() as u32);
        buf[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);

        let hash = self.store.store(Chunk::from_array(buf))?;
        trace!(table = %self.table, ?key, %hash, len = payload.len(), "stored row chunk");
        Ok(hash)
    }

    /// Reads the payload stored for `key` in the chunk at `storage`
    pub fn get(&self, key: &IndexKey, storage: &ChunkAddress) -> Result<Record> {
        let chunk = self.store.retrieve(storage)?;
        let buf = chunk.data();

        if buf[TAG_OFFSET] != ROW_TAG {
            return Err(DbError::malformed_record(*storage, "not a row chunk"));
        }
        let expected = self.content_address(key);
        if buf[ADDRESS_OFFSET..ADDRESS_OFFSET + 32] != expected.as_bytes()[..] {
            return Err(DbError::malformed_record(*storage, format!("row for another key than {key:?}")));
        }
        let len = BigEndian::read_u32(&buf[LENGTH_OFFSET..LENGTH_OFFSET + 4]) as usize;
        if len > MAX_PAYLOAD {
            return Err(DbError::malformed_record(*storage, format!("payload length {len}")));
        }

        Ok(Record {
            payload: buf[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len].to_vec(),
            encrypted: buf[ENCRYPTED_OFFSET] == 1,
        })
    }
}

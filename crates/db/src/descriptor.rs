//! Table descriptor chunk.
//!
//! ```text
//! offset            contents
//! 0 .. 32           owner, zero padded
//! 32 .. 64          table name, zero padded
//! 64 .. 72          B+tree leaf fanout, u64 big-endian
//! 72 .. 80          B+tree branch fanout, u64 big-endian
//! 2048 + 64*i       column i:
//!   +0 .. +25         name, zero padded
//!   +26               1 if primary
//!   +28               column type code
//!   +30               index type code
//!   +32 .. +64        index root hash
//! 4000 .. 4008      encrypted flag, u64 big-endian
//! ```
//!
//! Column entries end at the first entry whose name starts with a zero
//! byte. The primary column is written first, secondaries follow by name.
//! Every B+tree column of a table shares the fanout it was created with.

use byteorder::{BigEndian, ByteOrder};
use comb_index::Fanout;
use comb_primitives::{CHUNK_SIZE, Chunk, ChunkAddress};

use crate::{
    DbError, Result,
    column::{Column, ColumnInfo, ColumnType, IndexType, MAX_COLUMN_NAME},
};

/// Longest owner or table name
pub const MAX_NAME: usize = 32;

/// Most columns a descriptor can hold
pub const MAX_COLUMNS: usize = (ENCRYPTED_OFFSET - COLUMNS_OFFSET) / COLUMN_ENTRY;

const OWNER_OFFSET: usize = 0;
const TABLE_OFFSET: usize = 32;
const LEAF_FANOUT_OFFSET: usize = 64;
const BRANCH_FANOUT_OFFSET: usize = 72;
const COLUMNS_OFFSET: usize = 2048;
const COLUMN_ENTRY: usize = 64;
const ENCRYPTED_OFFSET: usize = 4000;

const PRIMARY_AT: usize = 26;
const COLUMN_TYPE_AT: usize = 28;
const INDEX_TYPE_AT: usize = 30;
const ROOT_AT: usize = 32;

/// Persisted description of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    /// Owning account
    pub owner: String,
    /// Table name
    pub table: String,
    /// Whether row payloads pass through a cipher
    pub encrypted: bool,
    /// Node capacities of the B+tree columns
    pub fanout: Fanout,
    /// Columns, primary first
    pub columns: Vec<ColumnInfo>,
}

impl TableDescriptor {
    /// The primary column
    pub fn primary(&self) -> Option<&ColumnInfo> {
        self.columns.iter().find(|info| info.column.primary)
    }

    /// Serializes the descriptor into its chunk
    pub fn encode(&self) -> Result<Chunk> {
        if self.columns.len() > MAX_COLUMNS {
            return Err(DbError::invalid_schema(format!(
                "{} columns (max: {MAX_COLUMNS})",
                self.columns.len()
            )));
        }

        let mut buf = [0u8; CHUNK_SIZE];
        put_name(&mut buf[OWNER_OFFSET..OWNER_OFFSET + MAX_NAME], &self.owner)?;
        put_name(&mut buf[TABLE_OFFSET..TABLE_OFFSET + MAX_NAME], &self.table)?;
        BigEndian::write_u64(&mut buf[LEAF_FANOUT_OFFSET..LEAF_FANOUT_OFFSET + 8], self.fanout.leaf as u64);
        BigEndian::write_u64(&mut buf[BRANCH_FANOUT_OFFSET..BRANCH_FANOUT_OFFSET + 8], self.fanout.branch as u64);

        let mut ordered: Vec<&ColumnInfo> = self.columns.iter().collect();
        ordered.sort_by(|a, b| b.column.primary.cmp(&a.column.primary).then(a.column.name.cmp(&b.column.name)));
        for (i, info) in ordered.into_iter().enumerate() {
            let entry = &mut buf[COLUMNS_OFFSET + i * COLUMN_ENTRY..COLUMNS_OFFSET + (i + 1) * COLUMN_ENTRY];
            put_name(&mut entry[..MAX_COLUMN_NAME], &info.column.name)?;
            entry[PRIMARY_AT] = u8::from(info.column.primary);
            entry[COLUMN_TYPE_AT] = u8::from(info.column.column_type);
            entry[INDEX_TYPE_AT] = u8::from(info.column.index_type);
            entry[ROOT_AT..].copy_from_slice(info.root_hash.as_bytes());
        }

        BigEndian::write_u64(&mut buf[ENCRYPTED_OFFSET..ENCRYPTED_OFFSET + 8], u64::from(self.encrypted));
        Ok(Chunk::from_array(buf))
    }

    /// Parses a descriptor chunk
    pub fn decode(chunk: &Chunk) -> Result<Self> {
        let buf = chunk.data();
        let owner = get_name(&buf[OWNER_OFFSET..OWNER_OFFSET + MAX_NAME], "owner")?;
        let table = get_name(&buf[TABLE_OFFSET..TABLE_OFFSET + MAX_NAME], "table name")?;
        let leaf = BigEndian::read_u64(&buf[LEAF_FANOUT_OFFSET..LEAF_FANOUT_OFFSET + 8]);
        let branch = BigEndian::read_u64(&buf[BRANCH_FANOUT_OFFSET..BRANCH_FANOUT_OFFSET + 8]);
        let fanout = usize::try_from(leaf)
            .ok()
            .zip(usize::try_from(branch).ok())
            .and_then(|(leaf, branch)| Fanout::new(leaf, branch).ok())
            .ok_or_else(|| DbError::MalformedDescriptor(format!("fanout {leaf}/{branch}")))?;

        let mut columns = Vec::new();
        for i in 0..MAX_COLUMNS {
            let entry = &buf[COLUMNS_OFFSET + i * COLUMN_ENTRY..COLUMNS_OFFSET + (i + 1) * COLUMN_ENTRY];
            if entry[0] == 0 {
                break;
            }
            let name = get_name(&entry[..MAX_COLUMN_NAME], "column name")?;
            let column_type = ColumnType::try_from(entry[COLUMN_TYPE_AT]).map_err(|_| {
                DbError::MalformedDescriptor(format!("column {name}: type code {}", entry[COLUMN_TYPE_AT]))
            })?;
            let index_type = IndexType::try_from(entry[INDEX_TYPE_AT]).map_err(|_| {
                DbError::MalformedDescriptor(format!("column {name}: index code {}", entry[INDEX_TYPE_AT]))
            })?;
            let root_hash = ChunkAddress::from_slice(&entry[ROOT_AT..])?;
            columns.push(ColumnInfo {
                column: Column {
                    name,
                    column_type,
                    index_type,
                    primary: entry[PRIMARY_AT] == 1,
                },
                root_hash,
            });
        }

        let primaries = columns.iter().filter(|info| info.column.primary).count();
        if primaries != 1 {
            return Err(DbError::MalformedDescriptor(format!("{primaries} primary columns")));
        }

        Ok(Self {
            owner,
            table,
            encrypted: BigEndian::read_u64(&buf[ENCRYPTED_OFFSET..ENCRYPTED_OFFSET + 8]) != 0,
            fanout,
            columns,
        })
    }
}

fn put_name(slot: &mut [u8], name: &str) -> Result<()> {
    if name.len() > slot.len() {
        return Err(DbError::invalid_schema(format!(
            "name {name:?} longer than {} bytes",
            slot.len()
        )));
    }
    slot[..name.len()].copy_from_slice(name.as_bytes());
    Ok(())
}

fn get_name(slot: &[u8], what: &str) -> Result<String> {
    let end = slot.iter().position(|b| *b == 0).unwrap_or(slot.len());
    String::from_utf8(slot[..end].to_vec())
        .map_err(|_| DbError::MalformedDescriptor(format!("{what} is not UTF-8")))
}

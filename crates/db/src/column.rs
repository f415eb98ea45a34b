//! Column definitions.

use core::fmt;

use comb_primitives::ChunkAddress;
use serde::{Deserialize, Serialize};

/// The scalar type of a column; shared with the index key orderings
pub use comb_index::KeyType as ColumnType;

/// Longest column name that fits a descriptor entry
pub const MAX_COLUMN_NAME: usize = 25;

/// The index kind backing a column
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[derive(strum::IntoStaticStr)]
#[derive(strum::VariantArray)]
#[derive(strum::EnumString)]
#[derive(num_enum::TryFromPrimitive)]
#[derive(Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum IndexType {
    /// Unordered 64-ary hash trie
    HashTrie = 1,
    /// Ordered B+tree
    BPlusTree = 2,
}

impl IndexType {
    /// Returns the lowercase name of the index kind
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Whether cursors over this index follow key order
    pub const fn is_ordered(&self) -> bool {
        matches!(self, Self::BPlusTree)
    }
}

impl From<IndexType> for u8 {
    #[inline]
    fn from(index_type: IndexType) -> Self {
        index_type as Self
    }
}

impl fmt::Display for IndexType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column of a table schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, at most [`MAX_COLUMN_NAME`] bytes
    pub name: String,
    /// Value type
    pub column_type: ColumnType,
    /// Backing index
    pub index_type: IndexType,
    /// Whether rows are stored under this column
    pub primary: bool,
}

impl Column {
    /// A primary column
    pub fn primary(name: impl Into<String>, column_type: ColumnType, index_type: IndexType) -> Self {
        Self {
            name: name.into(),
            column_type,
            index_type,
            primary: true,
        }
    }

    /// A secondary column
    pub fn secondary(name: impl Into<String>, column_type: ColumnType, index_type: IndexType) -> Self {
        Self {
            name: name.into(),
            column_type,
            index_type,
            primary: false,
        }
    }
}

/// A column together with the root of its index, as described by a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// The column definition
    #[serde(flatten)]
    pub column: Column,
    /// Root hash of the column's index; zero while empty
    pub root_hash: ChunkAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_index_type_codes() {
        assert_eq!(u8::from(IndexType::HashTrie), 1);
        assert_eq!(u8::from(IndexType::BPlusTree), 2);
        assert_eq!(IndexType::try_from(2u8).unwrap(), IndexType::BPlusTree);
        assert!(IndexType::try_from(3u8).is_err());
        assert_eq!(IndexType::from_str("BPlusTree").unwrap(), IndexType::BPlusTree);
        assert_eq!(IndexType::HashTrie.to_string(), "hashtrie");
    }

    #[test]
    fn test_column_json() {
        let column = Column::primary("email", ColumnType::String, IndexType::BPlusTree);
        let json = serde_json::to_string(&column).unwrap();
        assert_eq!(
            json,
            r#"{"name":"email","column_type":"string","index_type":"bplustree","primary":true}"#
        );
        assert_eq!(serde_json::from_str::<Column>(&json).unwrap(), column);
    }
}

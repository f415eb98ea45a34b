//! Tables over chunk-persisted indexes
//!
//! A table has one primary column and any number of secondary columns,
//! each backed by a [`comb_index`] B+tree or hash trie. Rows are stored as
//! JSON payloads in their own chunks, one per primary key, and the table
//! itself is described by a descriptor chunk that a [`NameService`] points
//! at.
//!
//! ## Key Components
//!
//! - **[`SwarmDb`]**: creates, opens and drops tables of many owners
//! - **[`Table`]**: put, get, delete, scan and select over one table,
//!   with optional buffering of index writes
//! - **[`KeyValueStore`]**: the row payload chunks and their content
//!   addresses
//! - **[`IndexRegistry`]**: table roots and the shared chunk store
//!
//! ## Usage Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use comb_db::{Column, ColumnType, DbConfig, IndexType, MemoryNameService, Row, SwarmDb};
//! use comb_primitives::MemoryChunkStore;
//!
//! let mut db = SwarmDb::new(
//!     MemoryChunkStore::new(),
//!     Arc::new(MemoryNameService::new()),
//!     DbConfig::default(),
//! )
//! .unwrap();
//!
//! let table = db
//!     .create_table(
//!         "alice",
//!         "contacts",
//!         vec![
//!             Column::primary("email", ColumnType::String, IndexType::BPlusTree),
//!             Column::secondary("age", ColumnType::Integer, IndexType::HashTrie),
//!         ],
//!         None,
//!     )
//!     .unwrap();
//!
//! let row = Row::new().with("email", "a@x.com").with("age", 38);
//! table.put(&row).unwrap();
//!
//! assert_eq!(table.get(&"a@x.com".into()).unwrap(), Some(row.clone()));
//! assert_eq!(table.get_by("age", &38.into()).unwrap(), Some(row));
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod cipher;
pub mod column;
pub mod config;
mod db;
pub mod descriptor;
pub mod error;
pub mod filter;
pub mod index;
pub mod kv;
pub mod registry;
pub mod table;
pub mod value;

pub use cipher::{NoCipher, PayloadCipher};
pub use column::{Column, ColumnInfo, ColumnType, IndexType};
pub use config::DbConfig;
pub use db::SwarmDb;
pub use descriptor::TableDescriptor;
pub use error::{DbError, Result};
pub use filter::{Filter, Operator};
pub use index::ColumnIndex;
pub use kv::{KeyValueStore, Record};
pub use registry::{IndexRegistry, MemoryNameService, NameService};
pub use table::Table;
pub use value::{Row, Value};

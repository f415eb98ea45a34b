//! Table root pointers.
//!
//! A table is reachable through the hash of its descriptor chunk. The
//! [`NameService`] maps a table id (`"owner|table"`) to that hash; the
//! [`IndexRegistry`] pairs a name service with the chunk store every
//! index of every table reads from.

use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use comb_primitives::{ChunkAddress, ChunkStore};
use parking_lot::RwLock;
use tracing::debug;

use crate::{DbError, Result, descriptor::MAX_NAME};

/// Separator between owner and table name in a table id
pub const TABLE_ID_SEPARATOR: char = '|';

/// Mutable name to root-hash mapping
pub trait NameService: Debug + Send + Sync {
    /// Current root hash of `table_id`, if registered
    fn root_hash(&self, table_id: &str) -> Result<Option<ChunkAddress>>;

    /// Points `table_id` at `hash`
    fn set_root_hash(&self, table_id: &str, hash: ChunkAddress) -> Result<()>;

    /// Unregisters `table_id`, returning whether it was registered
    fn remove(&self, table_id: &str) -> Result<bool>;

    /// Every registered table id
    fn table_ids(&self) -> Result<Vec<String>>;
}

/// In-process [`NameService`]; clones share the same mapping
#[derive(Debug, Clone, Default)]
pub struct MemoryNameService {
    roots: Arc<RwLock<BTreeMap<String, ChunkAddress>>>,
}

impl MemoryNameService {
    /// Creates an empty name service
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameService for MemoryNameService {
    fn root_hash(&self, table_id: &str) -> Result<Option<ChunkAddress>> {
        Ok(self.roots.read().get(table_id).copied())
    }

    fn set_root_hash(&self, table_id: &str, hash: ChunkAddress) -> Result<()> {
        self.roots.write().insert(table_id.to_owned(), hash);
        Ok(())
    }

    fn remove(&self, table_id: &str) -> Result<bool> {
        Ok(self.roots.write().remove(table_id).is_some())
    }

    fn table_ids(&self) -> Result<Vec<String>> {
        Ok(self.roots.read().keys().cloned().collect())
    }
}

/// The chunk store and name service shared by all tables of a database
#[derive(Debug, Clone)]
pub struct IndexRegistry<S> {
    store: S,
    names: Arc<dyn NameService>,
}

impl<S: ChunkStore + Clone> IndexRegistry<S> {
    /// Creates a registry over `store` and `names`
    pub fn new(store: S, names: Arc<dyn NameService>) -> Self {
        Self { store, names }
    }

    /// The shared chunk store
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The id under which `owner`'s `table` is registered
    pub fn table_id(owner: &str, table: &str) -> String {
        format!("{owner}{TABLE_ID_SEPARATOR}{table}")
    }

    /// Checks an owner or table name for use in ids and chunk headers
    pub fn check_name(kind: &str, name: &str) -> Result<()> {
        if name.is_empty() || name.len() > MAX_NAME || name.contains(TABLE_ID_SEPARATOR) || name.contains('\0') {
            return Err(DbError::invalid_schema(format!(
                "{kind} name {name:?} must be 1 to {MAX_NAME} bytes without '{TABLE_ID_SEPARATOR}'"
            )));
        }
        Ok(())
    }

    /// Descriptor hash of `owner`'s `table`, if registered
    pub fn root_hash(&self, owner: &str, table: &str) -> Result<Option<ChunkAddress>> {
        self.names.root_hash(&Self::table_id(owner, table))
    }

    /// Points `owner`'s `table` at a new descriptor hash
    pub fn set_root_hash(&self, owner: &str, table: &str, hash: ChunkAddress) -> Result<()> {
        let id = Self::table_id(owner, table);
        self.names.set_root_hash(&id, hash)?;
        debug!(table = %id, root = %hash, "updated table root");
        Ok(())
    }

    /// Unregisters `owner`'s `table`
    pub fn remove(&self, owner: &str, table: &str) -> Result<()> {
        let id = Self::table_id(owner, table);
        if !self.names.remove(&id)? {
            return Err(DbError::NoSuchTable(id));
        }
        debug!(table = %id, "removed table root");
        Ok(())
    }

    /// Names of `owner`'s tables, sorted
    pub fn tables(&self, owner: &str) -> Result<Vec<String>> {
        let prefix = format!("{owner}{TABLE_ID_SEPARATOR}");
        let mut tables: Vec<String> = self
            .names
            .table_ids()?
            .into_iter()
            .filter_map(|id| id.strip_prefix(&prefix).map(str::to_owned))
            .collect();
        tables.sort_unstable();
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comb_primitives::MemoryChunkStore;

    fn registry() -> IndexRegistry<MemoryChunkStore> {
        IndexRegistry::new(MemoryChunkStore::new(), Arc::new(MemoryNameService::new()))
    }

    #[test]
    fn test_roots_by_owner() {
        let registry = registry();
        registry.set_root_hash("alice", "b", ChunkAddress::keccak(b"1")).unwrap();
        registry.set_root_hash("alice", "a", ChunkAddress::keccak(b"2")).unwrap();
        registry.set_root_hash("bob", "c", ChunkAddress::keccak(b"3")).unwrap();

        assert_eq!(registry.tables("alice").unwrap(), ["a", "b"]);
        assert_eq!(registry.tables("bob").unwrap(), ["c"]);
        assert_eq!(
            registry.root_hash("alice", "a").unwrap(),
            Some(ChunkAddress::keccak(b"2"))
        );
        assert_eq!(registry.root_hash("alice", "c").unwrap(), None);
    }

    #[test]
    fn test_remove() {
        let registry = registry();
        registry.set_root_hash("alice", "a", ChunkAddress::keccak(b"1")).unwrap();
        registry.remove("alice", "a").unwrap();
        assert!(matches!(registry.remove("alice", "a"), Err(DbError::NoSuchTable(_))));
    }

    #[test]
    fn test_name_rules() {
        type Registry = IndexRegistry<MemoryChunkStore>;
        assert!(Registry::check_name("table", "contacts").is_ok());
        assert!(Registry::check_name("table", "").is_err());
        assert!(Registry::check_name("owner", "a|b").is_err());
        assert!(Registry::check_name("table", &"x".repeat(33)).is_err());
        assert_eq!(Registry::table_id("alice", "contacts"), "alice|contacts");
    }

    #[test]
    fn test_clones_share_mapping() {
        let names = MemoryNameService::new();
        let other = names.clone();
        names.set_root_hash("a|b", ChunkAddress::keccak(b"x")).unwrap();
        assert_eq!(other.table_ids().unwrap(), ["a|b"]);
    }
}

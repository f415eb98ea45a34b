//! The database facade.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use comb_primitives::{ChunkAddress, ChunkStore};
use tracing::debug;

use crate::{
    DbConfig, DbError, Result, Row, Value,
    cipher::PayloadCipher,
    column::Column,
    filter::Filter,
    registry::{IndexRegistry, NameService},
    table::Table,
};

/// Tables of many owners over one chunk store and name service
///
/// Tables are opened on first use and stay open until closed or dropped.
#[derive(Debug)]
pub struct SwarmDb<S> {
    registry: IndexRegistry<S>,
    config: DbConfig,
    cipher: Option<Arc<dyn PayloadCipher>>,
    tables: HashMap<String, Table<S>>,
}

impl<S: ChunkStore + Clone> SwarmDb<S> {
    /// Creates a database over `store` and `names`
    pub fn new(store: S, names: Arc<dyn NameService>, config: DbConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: IndexRegistry::new(store, names),
            config,
            cipher: None,
            tables: HashMap::new(),
        })
    }

    /// Sets the cipher used by encrypted tables opened from now on
    pub fn with_cipher(mut self, cipher: Arc<dyn PayloadCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// The configuration tables are opened with
    pub const fn config(&self) -> &DbConfig {
        &self.config
    }

    /// The shared registry
    pub const fn registry(&self) -> &IndexRegistry<S> {
        &self.registry
    }

    /// Creates, registers and opens a table
    ///
    /// `encrypted` defaults to [`DbConfig::encrypted`].
    pub fn create_table(
        &mut self,
        owner: &str,
        name: &str,
        columns: Vec<Column>,
        encrypted: Option<bool>,
    ) -> Result<&mut Table<S>> {
        let id = IndexRegistry::<S>::table_id(owner, name);
        if self.tables.contains_key(&id) {
            return Err(DbError::TableExists(id));
        }
        let table = Table::create(
            self.registry.clone(),
            owner,
            name,
            columns,
            encrypted.unwrap_or(self.config.encrypted),
            &self.config,
            self.cipher.clone(),
        )?;
        Ok(self.tables.entry(id).or_insert(table))
    }

    /// Opens a registered table, or returns it if already open
    pub fn open_table(&mut self, owner: &str, name: &str) -> Result<&mut Table<S>> {
        match self.tables.entry(IndexRegistry::<S>::table_id(owner, name)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let table = Table::open(
                    self.registry.clone(),
                    owner,
                    name,
                    &self.config,
                    self.cipher.clone(),
                )?;
                Ok(entry.insert(table))
            }
        }
    }

    /// Closes an open table, flushing a pending buffer
    pub fn close_table(&mut self, owner: &str, name: &str) -> Result<ChunkAddress> {
        let id = IndexRegistry::<S>::table_id(owner, name);
        self.tables
            .remove(&id)
            .ok_or(DbError::NoSuchTable(id))?
            .close()
    }

    /// Unregisters a table; buffered changes are lost and its chunks stay
    /// in the store
    pub fn drop_table(&mut self, owner: &str, name: &str) -> Result<()> {
        self.tables.remove(&IndexRegistry::<S>::table_id(owner, name));
        self.registry.remove(owner, name)?;
        debug!(owner, table = name, "dropped table");
        Ok(())
    }

    /// Names of `owner`'s registered tables, sorted
    pub fn list_tables(&self, owner: &str) -> Result<Vec<String>> {
        self.registry.tables(owner)
    }

    /// Closes every open table
    pub fn close(mut self) -> Result<()> {
        for (_, table) in self.tables.drain() {
            table.close()?;
        }
        Ok(())
    }

    /// See [`Table::put`]
    pub fn put(&mut self, owner: &str, table: &str, row: &Row) -> Result<()> {
        self.open_table(owner, table)?.put(row)
    }

    /// See [`Table::insert`]
    pub fn insert(&mut self, owner: &str, table: &str, row: &Row) -> Result<()> {
        self.open_table(owner, table)?.insert(row)
    }

    /// See [`Table::get`]
    pub fn get(&mut self, owner: &str, table: &str, key: &Value) -> Result<Option<Row>> {
        self.open_table(owner, table)?.get(key)
    }

    /// See [`Table::delete`]
    pub fn delete(&mut self, owner: &str, table: &str, key: &Value) -> Result<()> {
        self.open_table(owner, table)?.delete(key)
    }

    /// See [`Table::scan`]
    pub fn scan(&mut self, owner: &str, table: &str, column: &str, ascending: bool) -> Result<Vec<Row>> {
        self.open_table(owner, table)?.scan(column, ascending)
    }

    /// See [`Table::select`]
    pub fn select(&mut self, owner: &str, table: &str, filter: &Filter) -> Result<Vec<Row>> {
        self.open_table(owner, table)?.select(filter)
    }
}

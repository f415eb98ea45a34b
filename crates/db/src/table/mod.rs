//! Tables: one primary index, any number of secondary indexes and the
//! row payloads they point at.
//!
//! The primary index maps a row's primary key to the storage hash of its
//! payload chunk. Each secondary index maps a column value to the primary
//! key of the row holding it; when two rows share a secondary value the
//! last one written wins.
//!
//! Outside a buffer every mutation flushes the touched indexes and rewrites
//! the descriptor, so the registry always points at the latest state. Inside
//! a buffer nothing but row payload chunks reaches the store until
//! [`Table::flush_buffer`].

use std::{collections::BTreeMap, sync::Arc};

use comb_index::{Fanout, Index, IndexKey};
use comb_primitives::{ChunkAddress, ChunkStore};
use tracing::{debug, trace, warn};

use crate::{
    DbConfig, DbError, Result, Row, Value,
    cipher::{MissingCipher, NoCipher, PayloadCipher},
    column::{Column, ColumnInfo, MAX_COLUMN_NAME},
    descriptor::{MAX_COLUMNS, TableDescriptor},
    filter::{Filter, Operator},
    index::ColumnIndex,
    kv::KeyValueStore,
    registry::IndexRegistry,
};

#[derive(Debug)]
struct ColumnEntry<S> {
    column: Column,
    index: ColumnIndex<S>,
}

impl<S: ChunkStore> ColumnEntry<S> {
    fn open(store: S, column: Column, root_hash: ChunkAddress, fanout: Fanout) -> Self {
        let index = ColumnIndex::open(store, &column, root_hash, fanout);
        Self { column, index }
    }

    fn info(&self) -> ColumnInfo {
        ColumnInfo {
            column: self.column.clone(),
            root_hash: self.index.root_hash(),
        }
    }

    fn key_of(&self, value: &Value) -> Result<IndexKey> {
        value.to_key(&self.column.name, self.column.column_type)
    }
}

/// An open table
#[derive(Debug)]
pub struct Table<S> {
    owner: String,
    name: String,
    encrypted: bool,
    buffered: bool,
    fanout: Fanout,
    primary: ColumnEntry<S>,
    secondaries: BTreeMap<String, ColumnEntry<S>>,
    kv: KeyValueStore<S>,
    registry: IndexRegistry<S>,
    cipher: Arc<dyn PayloadCipher>,
    descriptor_hash: ChunkAddress,
}

impl<S: ChunkStore + Clone> Table<S> {
    /// Creates and registers an empty table
    pub(crate) fn create(
        registry: IndexRegistry<S>,
        owner: &str,
        name: &str,
        columns: Vec<Column>,
        encrypted: bool,
        config: &DbConfig,
        cipher: Option<Arc<dyn PayloadCipher>>,
    ) -> Result<Self> {
        IndexRegistry::<S>::check_name("owner", owner)?;
        IndexRegistry::<S>::check_name("table", name)?;
        check_schema(&columns)?;
        if registry.root_hash(owner, name)?.is_some() {
            return Err(DbError::TableExists(IndexRegistry::<S>::table_id(owner, name)));
        }

        let fanout = config.fanout()?;
        let infos = columns
            .into_iter()
            .map(|column| ColumnInfo {
                column,
                root_hash: ChunkAddress::zero(),
            })
            .collect();
        let descriptor = TableDescriptor {
            owner: owner.to_owned(),
            table: name.to_owned(),
            encrypted,
            fanout,
            columns: infos,
        };

        let mut table = Self::assemble(registry, descriptor, ChunkAddress::zero(), config, cipher)?;
        table.persist_descriptor()?;
        debug!(owner, table = name, encrypted, descriptor = %table.descriptor_hash, "created table");
        if config.buffered {
            table.start_buffer()?;
        }
        Ok(table)
    }

    /// Opens the table the registry currently points at
    pub(crate) fn open(
        registry: IndexRegistry<S>,
        owner: &str,
        name: &str,
        config: &DbConfig,
        cipher: Option<Arc<dyn PayloadCipher>>,
    ) -> Result<Self> {
        let Some(root) = registry.root_hash(owner, name)? else {
            return Err(DbError::NoSuchTable(IndexRegistry::<S>::table_id(owner, name)));
        };
        let chunk = registry.store().retrieve(&root)?;
        let descriptor = TableDescriptor::decode(&chunk)?;
        if descriptor.owner != owner || descriptor.table != name {
            return Err(DbError::MalformedDescriptor(format!(
                "descriptor {root} belongs to {}",
                IndexRegistry::<S>::table_id(&descriptor.owner, &descriptor.table)
            )));
        }

        // nodes already written were sized by the fanout the table was created with
        if config.fanout()? != descriptor.fanout {
            debug!(
                owner,
                table = name,
                leaf = descriptor.fanout.leaf,
                branch = descriptor.fanout.branch,
                "keeping persisted fanout"
            );
        }
        let mut table = Self::assemble(registry, descriptor, root, config, cipher)?;
        debug!(owner, table = name, descriptor = %root, "opened table");
        if config.buffered {
            table.start_buffer()?;
        }
        Ok(table)
    }

    fn assemble(
        registry: IndexRegistry<S>,
        descriptor: TableDescriptor,
        descriptor_hash: ChunkAddress,
        config: &DbConfig,
        cipher: Option<Arc<dyn PayloadCipher>>,
    ) -> Result<Self> {
        let TableDescriptor {
            owner,
            table,
            encrypted,
            fanout,
            columns,
        } = descriptor;

        let mut primary = None;
        let mut secondaries = BTreeMap::new();
        for info in columns {
            let entry = ColumnEntry::open(registry.store().clone(), info.column, info.root_hash, fanout);
            if entry.column.primary {
                primary = Some(entry);
            } else {
                secondaries.insert(entry.column.name.clone(), entry);
            }
        }
        let primary = primary.ok_or_else(|| DbError::MalformedDescriptor("no primary column".into()))?;

        let cipher: Arc<dyn PayloadCipher> = match (encrypted, cipher) {
            (false, _) => Arc::new(NoCipher),
            (true, Some(cipher)) => cipher,
            (true, None) => Arc::new(MissingCipher),
        };

        Ok(Self {
            kv: KeyValueStore::new(registry.store().clone(), &owner, &table, config.min_payload_len),
            owner,
            name: table,
            encrypted,
            buffered: false,
            fanout,
            primary,
            secondaries,
            registry,
            cipher,
            descriptor_hash,
        })
    }

    /// Owning account
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether row payloads pass through the cipher
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Whether mutations are currently buffered
    pub const fn is_buffered(&self) -> bool {
        self.buffered
    }

    /// Node capacities of the table's B+tree columns
    pub const fn fanout(&self) -> Fanout {
        self.fanout
    }

    /// The primary column
    pub const fn primary_column(&self) -> &Column {
        &self.primary.column
    }

    /// Hash of the last descriptor written for this table
    pub const fn descriptor_hash(&self) -> ChunkAddress {
        self.descriptor_hash
    }

    /// Columns with their current index roots, primary first
    pub fn describe(&self) -> Vec<ColumnInfo> {
        std::iter::once(&self.primary)
            .chain(self.secondaries.values())
            .map(ColumnEntry::info)
            .collect()
    }

    fn column(&self, name: &str) -> Result<&Column> {
        if name == self.primary.column.name {
            return Ok(&self.primary.column);
        }
        self.secondaries
            .get(name)
            .map(|entry| &entry.column)
            .ok_or_else(|| DbError::NoSuchColumn(name.to_owned()))
    }

    /// Stores `row`, replacing any row with the same primary key
    pub fn put(&mut self, row: &Row) -> Result<()> {
        self.write(row, true)
    }

    /// Stores `row`, failing with [`DbError::DuplicateKey`] if its primary
    /// key is present
    pub fn insert(&mut self, row: &Row) -> Result<()> {
        self.write(row, false)
    }

    fn write(&mut self, row: &Row, overwrite: bool) -> Result<()> {
        // Everything that can be rejected is checked before the first write.
        let primary_name = &self.primary.column.name;
        let pk_value = row
            .get(primary_name)
            .ok_or_else(|| DbError::MissingPrimaryKey(primary_name.clone()))?;
        let pk = self.primary.key_of(pk_value)?;

        let mut keys = Vec::new();
        for (name, value) in row {
            if *name == self.primary.column.name {
                continue;
            }
            let entry = self
                .secondaries
                .get(name)
                .ok_or_else(|| DbError::NoSuchColumn(name.clone()))?;
            keys.push((name.clone(), entry.key_of(value)?));
        }

        let previous = match self.primary.index.get(&pk)? {
            Some(_) if !overwrite => return Err(DbError::DuplicateKey),
            Some(storage) => Some(self.load_row(&pk, &storage)?),
            None => None,
        };
        let stale = match &previous {
            Some(old) => self.stale_keys(old, &keys)?,
            None => Vec::new(),
        };

        let plain = row.to_json()?;
        let payload = if self.encrypted {
            self.cipher.encrypt(&plain)?
        } else {
            plain
        };
        self.kv.check_payload(&payload)?;

        let storage = self.kv.put(&pk, &payload, self.encrypted)?;
        self.primary.index.put(&pk, storage)?;
        let target = row_pointer(&pk);
        for (name, key) in &stale {
            if let Some(entry) = self.secondaries.get_mut(name) {
                remove_if_points_at(&mut entry.index, key, &target)?;
            }
        }
        for (name, key) in &keys {
            if let Some(entry) = self.secondaries.get_mut(name) {
                entry.index.put(key, target)?;
            }
        }
        trace!(table = %self.name, key = ?pk, %storage, replaced = previous.is_some(), "put row");

        if !self.buffered {
            self.persist_descriptor()?;
        }
        Ok(())
    }

    /// Secondary keys of `old` that the new row no longer carries
    fn stale_keys(&self, old: &Row, keys: &[(String, IndexKey)]) -> Result<Vec<(String, IndexKey)>> {
        let mut stale = Vec::new();
        for (name, entry) in &self.secondaries {
            let Some(value) = old.get(name) else {
                continue;
            };
            let key = entry.key_of(value)?;
            if !keys.iter().any(|(n, k)| n == name && *k == key) {
                stale.push((name.clone(), key));
            }
        }
        Ok(stale)
    }

    /// Reads the row stored under primary key `key`
    ///
    /// A missing key is `Ok(None)`.
    pub fn get(&mut self, key: &Value) -> Result<Option<Row>> {
        let pk = self.primary.key_of(key)?;
        match self.primary.index.get(&pk)? {
            Some(storage) => self.load_row(&pk, &storage).map(Some),
            None => Ok(None),
        }
    }

    /// Reads the row whose `column` holds `value`, through that column's index
    pub fn get_by(&mut self, column: &str, value: &Value) -> Result<Option<Row>> {
        if column == self.primary.column.name {
            return self.get(value);
        }
        let entry = self
            .secondaries
            .get_mut(column)
            .ok_or_else(|| DbError::NoSuchColumn(column.to_owned()))?;
        let key = entry.key_of(value)?;
        let Some(pointer) = entry.index.get(&key)? else {
            return Ok(None);
        };

        let pk = IndexKey::from_slice(pointer.as_bytes())?;
        match self.primary.index.get(&pk)? {
            Some(storage) => self.load_row(&pk, &storage).map(Some),
            None => {
                warn!(table = %self.name, column, ?key, "secondary entry points at a missing row");
                Ok(None)
            }
        }
    }

    /// Removes the row stored under primary key `key` from every index
    ///
    /// Fails with [`DbError::KeyNotFound`] if there is no such row. The
    /// payload chunk itself stays in the store.
    pub fn delete(&mut self, key: &Value) -> Result<()> {
        let pk = self.primary.key_of(key)?;
        let Some(storage) = self.primary.index.get(&pk)? else {
            return Err(DbError::KeyNotFound);
        };
        let row = self.load_row(&pk, &storage)?;

        let target = row_pointer(&pk);
        let mut failed = None;
        for (name, entry) in &mut self.secondaries {
            let Some(value) = row.get(name) else {
                continue;
            };
            let result = entry
                .key_of(value)
                .and_then(|k| remove_if_points_at(&mut entry.index, &k, &target));
            if let Err(err) = result {
                warn!(table = %self.name, column = %name, %err, "could not remove secondary entry");
                failed = failed.or(Some(err));
            }
        }
        self.primary.index.delete(&pk)?;
        trace!(table = %self.name, key = ?pk, "deleted row");

        if !self.buffered {
            self.persist_descriptor()?;
        }
        failed.map_or(Ok(()), Err)
    }

    /// Every row in primary key order
    ///
    /// Only the primary column can be scanned, and only when a B+tree backs
    /// it.
    pub fn scan(&mut self, column: &str, ascending: bool) -> Result<Vec<Row>> {
        if column != self.primary.column.name {
            self.column(column)?;
            return Err(DbError::UnsupportedScan {
                column: column.to_owned(),
                reason: "only the primary column can be scanned",
            });
        }
        if !self.primary.column.index_type.is_ordered() {
            return Err(DbError::UnsupportedScan {
                column: column.to_owned(),
                reason: "a hash trie has no key order",
            });
        }
        self.rows(ascending)
    }

    /// Rows matching `filter`
    ///
    /// Equality on the primary key is a single lookup. Anything else visits
    /// every row, in key order for a B+tree primary and in bin order for a
    /// hash trie primary.
    pub fn select(&mut self, filter: &Filter) -> Result<Vec<Row>> {
        let column_type = self.column(&filter.column)?.column_type;
        filter.check(column_type)?;

        if filter.column == self.primary.column.name
            && filter.op == Operator::Eq
            && filter.value.matches(column_type)
        {
            return Ok(self.get(&filter.value)?.into_iter().collect());
        }

        let mut rows = self.rows(true)?;
        rows.retain(|row| filter.matches(row));
        Ok(rows)
    }

    fn rows(&mut self, forward: bool) -> Result<Vec<Row>> {
        let entries = self.primary.index.entries(forward)?;
        entries
            .into_iter()
            .map(|(pk, storage)| self.load_row(&pk, &storage))
            .collect()
    }

    fn load_row(&self, pk: &IndexKey, storage: &ChunkAddress) -> Result<Row> {
        let record = self.kv.get(pk, storage)?;
        let plain = if record.encrypted {
            self.cipher.decrypt(&record.payload)?
        } else {
            record.payload
        };
        Row::from_json(&plain)?
            .into_iter()
            .map(|(name, value)| {
                let value = match self.column(&name) {
                    Ok(column) => value.coerce(&name, column.column_type)?,
                    Err(_) => value,
                };
                Ok((name, value))
            })
            .collect()
    }

    /// Suspends persistence of index changes until [`Table::flush_buffer`]
    ///
    /// A table that is already buffering is flushed first.
    pub fn start_buffer(&mut self) -> Result<()> {
        if self.buffered {
            self.flush_buffer()?;
        }
        for entry in self.entries_mut() {
            entry.index.start_buffer();
        }
        self.buffered = true;
        debug!(table = %self.name, "started buffer");
        Ok(())
    }

    /// Persists every index, rewrites the descriptor and ends buffering
    ///
    /// Returns the new descriptor hash; without intervening writes a second
    /// call returns the same hash.
    pub fn flush_buffer(&mut self) -> Result<ChunkAddress> {
        for entry in self.entries_mut() {
            entry.index.flush_buffer()?;
        }
        self.buffered = false;
        let hash = self.persist_descriptor()?;
        debug!(table = %self.name, descriptor = %hash, "flushed buffer");
        Ok(hash)
    }

    /// Drops buffered index changes and returns to the last flushed state
    pub fn discard_buffer(&mut self) -> Result<()> {
        if !self.buffered {
            return Err(DbError::BufferNotStarted);
        }
        for entry in self.entries_mut() {
            entry.index.discard_buffer()?;
        }
        self.buffered = false;
        debug!(table = %self.name, "discarded buffer");
        Ok(())
    }

    /// Flushes a pending buffer and returns the final descriptor hash
    pub fn close(mut self) -> Result<ChunkAddress> {
        if self.buffered {
            self.flush_buffer()?;
        }
        debug!(table = %self.name, descriptor = %self.descriptor_hash, "closed table");
        Ok(self.descriptor_hash)
    }

    fn entries_mut(&mut self) -> impl Iterator<Item = &mut ColumnEntry<S>> {
        std::iter::once(&mut self.primary).chain(self.secondaries.values_mut())
    }

    fn persist_descriptor(&mut self) -> Result<ChunkAddress> {
        let descriptor = TableDescriptor {
            owner: self.owner.clone(),
            table: self.name.clone(),
            encrypted: self.encrypted,
            fanout: self.fanout,
            columns: self.describe(),
        };
        let hash = self.registry.store().store(descriptor.encode()?)?;
        self.registry.set_root_hash(&self.owner, &self.name, hash)?;
        self.descriptor_hash = hash;
        Ok(hash)
    }
}

/// The value a secondary index stores for a row: its primary key slot
fn row_pointer(pk: &IndexKey) -> ChunkAddress {
    ChunkAddress::new(*pk.as_bytes())
}

fn remove_if_points_at<S: ChunkStore>(
    index: &mut ColumnIndex<S>,
    key: &IndexKey,
    target: &ChunkAddress,
) -> Result<()> {
    if index.get(key)?.as_ref() == Some(target) {
        index.delete(key)?;
    }
    Ok(())
}

/// Checks a column list for [`Table::create`]
pub(crate) fn check_schema(columns: &[Column]) -> Result<()> {
    let primaries = columns.iter().filter(|column| column.primary).count();
    if primaries != 1 {
        return Err(DbError::invalid_schema(format!(
            "exactly one primary column required, found {primaries}"
        )));
    }
    if columns.len() > MAX_COLUMNS {
        return Err(DbError::invalid_schema(format!(
            "{} columns (max: {MAX_COLUMNS})",
            columns.len()
        )));
    }
    let mut seen = std::collections::BTreeSet::new();
    for column in columns {
        if column.name.is_empty() || column.name.len() > MAX_COLUMN_NAME || column.name.contains('\0') {
            return Err(DbError::invalid_schema(format!(
                "column name {:?} must be 1 to {MAX_COLUMN_NAME} bytes",
                column.name
            )));
        }
        if !seen.insert(column.name.as_str()) {
            return Err(DbError::invalid_schema(format!("duplicate column {}", column.name)));
        }
    }
    Ok(())
}

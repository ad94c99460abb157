use std::sync::{Arc, Mutex};

use log::{info, trace};
use serde::Serialize;

use crate::{
    config::Config,
    error::{Error, Result},
    sql::{
        schema::Table,
        types::{Row, RowId, Value},
    },
    storage::{self, engine::Engine as StorageEngine, keycode},
};

use super::{Engine, Transaction};

/// Key-value store backed SQL engine
pub struct KVEngine<E: StorageEngine> {
    pub kv: storage::txn::TxnManager<E>,
    config: Arc<Mutex<Config>>,
}

impl<E: StorageEngine> Clone for KVEngine<E> {
    fn clone(&self) -> Self {
        Self { kv: self.kv.clone(), config: self.config.clone() }
    }
}

impl<E: StorageEngine> KVEngine<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, Config::default())
    }

    pub fn with_config(engine: E, config: Config) -> Self {
        Self {
            kv: storage::txn::TxnManager::new(engine),
            config: Arc::new(Mutex::new(config)),
        }
    }
}

impl<E: StorageEngine + 'static> Engine for KVEngine<E> {
    type Transaction = KVTransaction<E>;

    fn begin(&self) -> Result<Self::Transaction> {
        let foreign_keys = self.config.lock()?.foreign_keys;
        Ok(Self::Transaction::new(self.kv.begin()?, foreign_keys))
    }

    fn read<R>(&self, f: impl FnOnce(&mut Self::Transaction) -> Result<R>) -> Result<R> {
        let foreign_keys = self.config.lock()?.foreign_keys;
        self.kv.read(|txn| f(&mut Self::Transaction::new(txn, foreign_keys)))
    }

    fn config(&self) -> Result<Config> {
        Ok(self.config.lock()?.clone())
    }

    fn set_config(&self, config: Config) -> Result<()> {
        info!("foreign key enforcement {}", if config.foreign_keys { "on" } else { "off" });
        *self.config.lock()? = config;
        Ok(())
    }
}

/// Key-value transaction (wrapper around the storage transaction)
pub struct KVTransaction<E: StorageEngine> {
    pub(super) txn: storage::txn::Transaction<E>,
    foreign_keys: bool,
}

impl<E: StorageEngine> KVTransaction<E> {
    pub fn new(txn: storage::txn::Transaction<E>, foreign_keys: bool) -> Self {
        Self { txn, foreign_keys }
    }

    pub fn state(&self) -> storage::txn::TransactionState {
        self.txn.state()
    }

    /// Stores a row under its row id
    fn write_row(&mut self, table: &Table, id: RowId, row: &Row) -> Result<()> {
        trace!("write {}[{}] = {:?}", table.name, id, row);
        let key = Key::Row(table.name.clone(), id).encode()?;
        self.txn.set(&key, bincode::serialize(&(id, row))?)
    }

    /// Greatest row id in the table, if any row exists
    fn last_row_id(&self, table: &Table) -> Result<Option<RowId>> {
        let prefix = KeyPrefix::Row(table.name.clone()).encode()?;
        self.txn
            .last_with_prefix(&prefix)?
            .map(|r| bincode::deserialize::<(RowId, Row)>(&r.value).map(|(id, _)| id))
            .transpose()
            .map_err(Error::from)
    }

    fn get_sequence(&self, table: &Table) -> Result<RowId> {
        let key = Key::Sequence(table.name.clone()).encode()?;
        Ok(self.txn.get(&key)?.map(|v| bincode::deserialize(&v)).transpose()?.unwrap_or(0))
    }

    fn set_sequence(&mut self, table: &Table, value: RowId) -> Result<()> {
        let key = Key::Sequence(table.name.clone()).encode()?;
        self.txn.set(&key, bincode::serialize(&value)?)
    }

    /// Whether row ids come from the table's sequence instead of max + 1
    fn uses_sequence(table: &Table) -> bool {
        !table.is_rowid_alias() || table.is_autoincrement()
    }

    /// Next row id: max row id + 1 for a plain INTEGER PRIMARY KEY, never
    /// reusing an id otherwise.
    fn next_row_id(&self, table: &Table) -> Result<RowId> {
        let mut last = self.last_row_id(table)?.unwrap_or(0);
        if Self::uses_sequence(table) {
            last = last.max(self.get_sequence(table)?);
        }
        last.checked_add(1)
            .ok_or_else(|| Error::Constraint(format!("row id overflow in table {}", table.name)))
    }
}

impl<E: StorageEngine> Transaction for KVTransaction<E> {
    fn commit(&mut self) -> Result<()> {
        self.txn.commit()
    }

    fn rollback(&mut self) -> Result<()> {
        self.txn.rollback()
    }

    fn is_active(&self) -> bool {
        self.txn.state() == storage::txn::TransactionState::Active
    }

    fn foreign_keys(&self) -> bool {
        self.foreign_keys
    }

    fn insert_row(&mut self, table: &Table, row: Row) -> Result<RowId> {
        let mut row = table.coerce_row(row)?;
        let pk = table.primary_key_index()?;

        let id = if table.is_rowid_alias() {
            match row[pk].clone() {
                Value::Integer(id) => id,
                Value::Null => {
                    let id = self.next_row_id(table)?;
                    row[pk] = Value::Integer(id);
                    id
                }
                v => {
                    return Err(Error::Internal(format!("invalid row id {} for {}", v, table.name)));
                }
            }
        } else {
            self.next_row_id(table)?
        };

        table.check_row(&row)?;
        self.check_unique(table, id, &row)?;
        if self.foreign_keys {
            self.check_foreign_keys(table, &row)?;
        }
        if Self::uses_sequence(table) && id > self.get_sequence(table)? {
            self.set_sequence(table, id)?;
        }
        self.set_index_entry(table, &row, id)?;
        self.write_row(table, id, &row)?;
        Ok(id)
    }

    fn update_row(&mut self, table: &Table, id: RowId, row: Row) -> Result<()> {
        let old = self.get_row(table, id)?.ok_or_else(|| {
            Error::Internal(format!("row {} not found in table {}", id, table.name))
        })?;
        let row = table.coerce_row(row)?;
        table.check_row(&row)?;

        let pk = table.primary_key_index()?;
        if old[pk] != row[pk] {
            return Err(Error::Constraint(format!(
                "cannot change primary key {}.{}",
                table.name, table.columns[pk].name
            )));
        }
        if self.foreign_keys {
            self.check_foreign_keys(table, &row)?;
            self.check_references(table, id, &old, Some(&row))?;
        }
        self.write_row(table, id, &row)
    }

    fn delete_row(&mut self, table: &Table, id: RowId) -> Result<()> {
        let Some(row) = self.get_row(table, id)? else {
            return Ok(());
        };
        if self.foreign_keys {
            self.check_references(table, id, &row, None)?;
        }
        self.delete_index_entry(table, &row)?;
        trace!("delete {}[{}]", table.name, id);
        self.txn.delete(&Key::Row(table.name.clone(), id).encode()?)
    }

    fn get_row(&self, table: &Table, id: RowId) -> Result<Option<Row>> {
        let key = Key::Row(table.name.clone(), id).encode()?;
        Ok(self
            .txn
            .get(&key)?
            .map(|v| bincode::deserialize::<(RowId, Row)>(&v))
            .transpose()?
            .map(|(_, row)| row))
    }

    fn scan_table(&self, table: &Table) -> Result<Vec<(RowId, Row)>> {
        // Use prefix scan to find all rows in the table
        let prefix = KeyPrefix::Row(table.name.clone()).encode()?;
        let mut rows = Vec::new();
        for result in self.txn.scan_prefix(&prefix)? {
            rows.push(bincode::deserialize(&result.value)?);
        }
        Ok(rows)
    }

    fn lookup_primary_key(&self, table: &Table, value: &Value) -> Result<Option<RowId>> {
        self.primary_key_entry(table, value)
    }

    fn create_table(&mut self, table: Table) -> Result<()> {
        table.validate()?;
        if self.get_table(&table.name)?.is_some() {
            return Err(Error::Schema(format!("table {} already exists", table.name)));
        }

        let key = Key::Table(table.name.clone()).encode()?;
        self.txn.set(&key, bincode::serialize(&table)?)?;
        info!("created table {} ({} columns)", table.name, table.columns.len());
        Ok(())
    }

    fn drop_table(&mut self, table_name: &str) -> Result<()> {
        let table = self.must_get_table(table_name)?;
        if self.foreign_keys {
            self.check_drop_references(&table)?;
        }

        let mut keys = vec![
            Key::Table(table.name.clone()).encode()?,
            Key::Sequence(table.name.clone()).encode()?,
        ];
        for prefix in [KeyPrefix::Row(table.name.clone()), KeyPrefix::Index(table.name.clone())] {
            keys.extend(self.txn.scan_prefix(&prefix.encode()?)?.into_iter().map(|r| r.key));
        }
        for key in &keys {
            self.txn.delete(key)?;
        }
        info!("dropped table {}", table.name);
        Ok(())
    }

    fn get_table(&self, table_name: &str) -> Result<Option<Table>> {
        let key = Key::Table(table_name.to_string()).encode()?;
        Ok(self.txn.get(&key)?.map(|v| bincode::deserialize(&v)).transpose()?)
    }

    fn list_tables(&self) -> Result<Vec<Table>> {
        let prefix = KeyPrefix::Table.encode()?;
        self.txn
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|r| -> Result<Table> { Ok(bincode::deserialize(&r.value)?) })
            .collect()
    }
}

/// Key types for KV storage operations
///
/// Keys are keycode-encoded, so rows of a table sort by row id.
#[derive(Debug, Serialize)]
pub(super) enum Key {
    Table(String),
    Row(String, RowId),
    /// Primary key value -> row id, for tables whose key is not the row id
    Index(String, Value),
    /// Highest row id handed out, for AUTOINCREMENT and non-integer keys
    Sequence(String),
}

impl Key {
    pub(super) fn encode(&self) -> Result<Vec<u8>> {
        keycode::serialize_key(self)
    }
}

/// Key prefix types for prefix scanning
///
/// Variants must keep the order of `Key`'s, the variant index is the first
/// encoded byte.
#[derive(Debug, Serialize)]
pub(super) enum KeyPrefix {
    Table,
    Row(String),
    Index(String),
}

impl KeyPrefix {
    pub(super) fn encode(&self) -> Result<Vec<u8>> {
        keycode::serialize_key(self)
    }
}

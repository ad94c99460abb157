//! Primary key index and foreign key enforcement for the KV engine.

use std::cmp::Ordering;

use crate::{
    error::{Error, Result},
    sql::{
        schema::{ForeignKey, Table},
        types::{Row, RowId, Value},
    },
    storage::engine::Engine as StorageEngine,
};

use super::{
    Transaction,
    kv::{KVTransaction, Key},
};

fn foreign_key_failed() -> Error {
    Error::Constraint("FOREIGN KEY constraint failed".into())
}

fn same_value(a: &Value, b: &Value) -> bool {
    a.compare(b) == Some(Ordering::Equal)
}

impl<E: StorageEngine> KVTransaction<E> {
    /// Looks up the row id of a primary key value: a direct row lookup for
    /// INTEGER PRIMARY KEY tables, an index entry otherwise.
    pub(super) fn primary_key_entry(&self, table: &Table, value: &Value) -> Result<Option<RowId>> {
        let column = &table.columns[table.primary_key_index()?];
        let Ok(value) = column.coerce(value.clone()) else {
            return Ok(None);
        };
        match value {
            Value::Null => Ok(None),
            Value::Integer(id) if table.is_rowid_alias() => {
                Ok(self.get_row(table, id)?.map(|_| id))
            }
            value => {
                let key = Key::Index(table.name.clone(), value).encode()?;
                Ok(self.txn.get(&key)?.map(|v| bincode::deserialize(&v)).transpose()?)
            }
        }
    }

    /// Fails if the row's primary key is already taken by another row.
    pub(super) fn check_unique(&self, table: &Table, id: RowId, row: &Row) -> Result<()> {
        let taken = if table.is_rowid_alias() {
            self.get_row(table, id)?.is_some()
        } else {
            self.primary_key_entry(table, table.get_primary_key(row)?)?
                .is_some_and(|existing| existing != id)
        };
        if taken {
            let column = &table.columns[table.primary_key_index()?];
            return Err(Error::Constraint(format!(
                "UNIQUE constraint failed: {}.{}",
                table.name, column.name
            )));
        }
        Ok(())
    }

    pub(super) fn set_index_entry(&mut self, table: &Table, row: &Row, id: RowId) -> Result<()> {
        if table.is_rowid_alias() {
            return Ok(());
        }
        let key = Key::Index(table.name.clone(), table.get_primary_key(row)?.clone()).encode()?;
        self.txn.set(&key, bincode::serialize(&id)?)
    }

    pub(super) fn delete_index_entry(&mut self, table: &Table, row: &Row) -> Result<()> {
        if table.is_rowid_alias() {
            return Ok(());
        }
        let key = Key::Index(table.name.clone(), table.get_primary_key(row)?.clone()).encode()?;
        self.txn.delete(&key)
    }

    /// Checks that every non-null foreign key value of a row exists in the
    /// parent table.
    pub(super) fn check_foreign_keys(&self, table: &Table, row: &Row) -> Result<()> {
        for fk in &table.foreign_keys {
            let value = &row[table.get_col_index(&fk.column)?];
            if value.is_null() {
                continue;
            }
            // A row may reference itself
            if fk.parent_table == table.name
                && same_value(&row[table.get_col_index(&fk.parent_column)?], value)
            {
                continue;
            }
            let Some(parent) = self.get_table(&fk.parent_table)? else {
                return Err(foreign_key_failed());
            };
            if !self.has_parent_value(&parent, &fk.parent_column, value)? {
                return Err(foreign_key_failed());
            }
        }
        Ok(())
    }

    fn has_parent_value(&self, parent: &Table, column: &str, value: &Value) -> Result<bool> {
        let Ok(index) = parent.get_col_index(column) else {
            return Err(foreign_key_failed());
        };
        if parent.columns[index].primary_key {
            return Ok(self.primary_key_entry(parent, value)?.is_some());
        }
        // Not the parent's key: no index to use
        Ok(self.scan_table(parent)?.iter().any(|(_, r)| same_value(&r[index], value)))
    }

    /// Returns all foreign keys referencing a table, with their child tables.
    /// This includes references from the table itself.
    fn table_references(&self, table_name: &str) -> Result<Vec<(Table, ForeignKey)>> {
        let mut references = Vec::new();
        for child in self.list_tables()? {
            for fk in child.foreign_keys.iter().filter(|fk| fk.parent_table == table_name) {
                references.push((child.clone(), fk.clone()));
            }
        }
        Ok(references)
    }

    /// Fails if child rows still reference a parent row being deleted, or
    /// being updated to `new` with a different referenced value.
    pub(super) fn check_references(
        &self,
        table: &Table,
        id: RowId,
        old: &Row,
        new: Option<&Row>,
    ) -> Result<()> {
        for (child, fk) in self.table_references(&table.name)? {
            let parent_index = table.get_col_index(&fk.parent_column)?;
            let value = &old[parent_index];
            if value.is_null() || new.is_some_and(|new| same_value(&new[parent_index], value)) {
                continue;
            }
            let child_index = child.get_col_index(&fk.column)?;
            let self_reference = child.name == table.name;
            let referenced = self.scan_table(&child)?.iter().any(|(child_id, r)| {
                !(self_reference && *child_id == id) && same_value(&r[child_index], value)
            });
            if referenced {
                return Err(foreign_key_failed());
            }
        }
        Ok(())
    }

    /// Fails if another table has rows referencing the table being dropped.
    pub(super) fn check_drop_references(&self, table: &Table) -> Result<()> {
        for (child, fk) in self.table_references(&table.name)? {
            if child.name == table.name {
                continue;
            }
            let child_index = child.get_col_index(&fk.column)?;
            if self.scan_table(&child)?.iter().any(|(_, r)| !r[child_index].is_null()) {
                return Err(foreign_key_failed());
            }
        }
        Ok(())
    }
}

use crate::{
    config::Config,
    error::{Error, Result},
    sql::{
        executor::ResultSet,
        plan::{Expression, Node, Plan},
        schema::{Column, Table},
        types::{Row, RowId, Value},
    },
};

mod index;
mod kv;

pub use kv::{KVEngine, KVTransaction};

/// SQL engine trait
pub trait Engine: Clone {
    type Transaction: Transaction + 'static;

    /// Begins a read-write transaction; fails while another one is active.
    fn begin(&self) -> Result<Self::Transaction>;

    /// Runs f against a read-only view of the committed state. Commits wait
    /// until f returns, so the view never changes underneath it.
    fn read<R>(&self, f: impl FnOnce(&mut Self::Transaction) -> Result<R>) -> Result<R>;

    fn config(&self) -> Result<Config>;

    fn set_config(&self, config: Config) -> Result<()>;

    fn session(&self) -> Session<Self> {
        Session { engine: self.clone() }
    }
}

/// SQL transaction trait (DDL and DML operations)
///
/// Row writes validate the row against the table schema: type coercion,
/// NOT NULL, CHECK, primary key uniqueness and, when enabled, foreign keys.
pub trait Transaction {
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    fn is_active(&self) -> bool;
    /// Whether foreign keys are enforced, as configured at begin
    fn foreign_keys(&self) -> bool;

    /// Inserts a full row, returns its row id
    fn insert_row(&mut self, table: &Table, row: Row) -> Result<RowId>;
    /// Replaces the row stored under id
    fn update_row(&mut self, table: &Table, id: RowId, row: Row) -> Result<()>;
    fn delete_row(&mut self, table: &Table, id: RowId) -> Result<()>;
    fn get_row(&self, table: &Table, id: RowId) -> Result<Option<Row>>;
    /// Scans table rows in row id order
    fn scan_table(&self, table: &Table) -> Result<Vec<(RowId, Row)>>;
    /// Finds the row id holding a primary key value
    fn lookup_primary_key(&self, table: &Table, value: &Value) -> Result<Option<RowId>>;

    // DDL operations
    fn create_table(&mut self, table: Table) -> Result<()>;
    fn drop_table(&mut self, table_name: &str) -> Result<()>;
    fn get_table(&self, table_name: &str) -> Result<Option<Table>>;
    fn list_tables(&self) -> Result<Vec<Table>>;

    /// Returns table info, returns error if table doesn't exist
    fn must_get_table(&self, table_name: &str) -> Result<Table> {
        self.get_table(table_name)?
            .ok_or_else(|| Error::Schema(format!("no such table: {}", table_name)))
    }

    /// Executes a plan in this transaction. On error the transaction is
    /// rolled back before the error is returned.
    fn execute(&mut self, node: Node) -> Result<ResultSet>
    where
        Self: Sized + 'static,
    {
        match Plan(node).execute(self) {
            Ok(result) => Ok(result),
            Err(err) => {
                if self.is_active() {
                    self.rollback()?;
                }
                Err(err)
            }
        }
    }
}

/// SQL session for executing plans
///
/// Standalone mutations run in their own transaction, committed on success
/// and rolled back on error. Standalone queries read the committed state.
pub struct Session<E: Engine> {
    engine: E,
}

impl<E: Engine> Clone for Session<E> {
    fn clone(&self) -> Self {
        Self { engine: self.engine.clone() }
    }
}

impl<E: Engine + 'static> Session<E> {
    /// Executes a plan
    pub fn execute(&self, node: Node) -> Result<ResultSet> {
        if node.is_query() {
            return self.engine.read(|txn| Plan(node).execute(txn));
        }
        let mut txn = self.engine.begin()?;
        match Plan(node).execute(&mut txn) {
            Ok(result) => {
                txn.commit()?;
                Ok(result)
            }
            Err(err) => {
                txn.rollback()?;
                Err(err)
            }
        }
    }

    /// Begins an explicit transaction
    pub fn begin(&self) -> Result<E::Transaction> {
        self.engine.begin()
    }

    /// Runs the closure in a transaction: commits on Ok, rolls back on Err.
    pub fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut E::Transaction) -> Result<R>,
    {
        let mut txn = self.engine.begin()?;
        match f(&mut txn) {
            Ok(result) => {
                // The closure may have committed already
                if txn.is_active() {
                    txn.commit()?;
                }
                Ok(result)
            }
            Err(err) => {
                if txn.is_active() {
                    txn.rollback()?;
                }
                Err(err)
            }
        }
    }

    pub fn create_table(&self, table: Table, if_not_exists: bool) -> Result<ResultSet> {
        self.execute(Node::create_table(table, if_not_exists))
    }

    pub fn drop_table(&self, table_name: &str, if_exists: bool) -> Result<ResultSet> {
        self.execute(Node::drop_table(table_name, if_exists))
    }

    pub fn insert(&self, table_name: &str, columns: &[&str], rows: Vec<Row>) -> Result<ResultSet> {
        self.execute(Node::insert(table_name, columns, rows))
    }

    pub fn update(
        &self,
        table_name: &str,
        assignments: Vec<(&str, Expression)>,
        predicate: Option<Expression>,
    ) -> Result<ResultSet> {
        self.execute(Node::update(table_name, assignments, predicate))
    }

    pub fn delete(&self, table_name: &str, predicate: Option<Expression>) -> Result<ResultSet> {
        self.execute(Node::delete(table_name, predicate))
    }

    /// Enables or disables FOREIGN KEY enforcement for transactions begun
    /// from now on.
    pub fn set_foreign_keys(&self, enabled: bool) -> Result<()> {
        self.engine.set_config(self.engine.config()?.foreign_keys(enabled))
    }

    /// Columns of a table in declaration order, empty if it doesn't exist
    pub fn table_info(&self, table_name: &str) -> Result<Vec<Column>> {
        let table = self.engine.read(|txn| txn.get_table(table_name))?;
        Ok(table.map(|t| t.columns).unwrap_or_default())
    }
}

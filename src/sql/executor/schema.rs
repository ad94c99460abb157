use log::debug;

use crate::{
    error::Result,
    sql::{
        engine::Transaction,
        executor::{Executor, ResultSet},
        schema::Table,
    },
};

/// CREATE TABLE executor
pub struct CreateTable {
    schema: Table,
    if_not_exists: bool,
}

impl CreateTable {
    pub fn new(schema: Table, if_not_exists: bool) -> Box<Self> {
        Box::new(Self { schema, if_not_exists })
    }
}

impl<T: Transaction> Executor<T> for CreateTable {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let table_name = self.schema.name.clone();
        if self.if_not_exists && txn.get_table(&table_name)?.is_some() {
            debug!("table {} already exists, skipping", table_name);
        } else {
            txn.create_table(self.schema)?;
        }
        Ok(ResultSet::CreateTable { table_name })
    }
}

/// DROP TABLE executor
pub struct DropTable {
    table_name: String,
    if_exists: bool,
}

impl DropTable {
    pub fn new(table_name: String, if_exists: bool) -> Box<Self> {
        Box::new(Self { table_name, if_exists })
    }
}

impl<T: Transaction> Executor<T> for DropTable {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        if self.if_exists && txn.get_table(&self.table_name)?.is_none() {
            debug!("table {} does not exist, skipping", self.table_name);
        } else {
            txn.drop_table(&self.table_name)?;
        }
        Ok(ResultSet::DropTable { table_name: self.table_name })
    }
}

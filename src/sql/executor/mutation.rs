use std::collections::HashMap;

use log::debug;

use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::{
            ResultSet,
            subquery::{evaluate, matches, prepare},
        },
        plan::Expression,
        schema::Table,
        types::{Row, RowId, Value},
    },
};

use super::Executor;

/// INSERT executor
pub struct Insert {
    table_name: String,
    columns: Vec<String>,
    values: Vec<Row>,
}

impl Insert {
    pub fn new(table_name: String, columns: Vec<String>, values: Vec<Row>) -> Box<Self> {
        Box::new(Self { table_name, columns, values })
    }
}

// Positional values fill the leading columns, the rest take their default:
// insert into tbl values(1, 2, 3);
// a       b       c          d
// 1       2       3      default
fn pad_row(table: &Table, row: Row) -> Result<Row> {
    if row.len() > table.columns.len() {
        return Err(Error::Query(format!(
            "table {} has {} columns but {} values were supplied",
            table.name,
            table.columns.len(),
            row.len()
        )));
    }
    let mut results = row;
    for column in table.columns.iter().skip(results.len()) {
        results.push(column.default.clone().unwrap_or(Value::Null));
    }
    Ok(results)
}

// Named columns take their values, the rest their default:
// insert into tbl(d, c) values(1, 2);
//    a          b       c          d
// default   default     2          1
fn make_row(table: &Table, columns: &[String], values: Row) -> Result<Row> {
    if columns.len() != values.len() {
        return Err(Error::Query(format!(
            "{} values for {} columns",
            values.len(),
            columns.len()
        )));
    }

    let mut inputs = HashMap::new();
    for (col_name, value) in columns.iter().zip(values) {
        table.get_col_index(col_name)?;
        if inputs.insert(col_name.as_str(), value).is_some() {
            return Err(Error::Query(format!("column {} given twice", col_name)));
        }
    }

    Ok(table
        .columns
        .iter()
        .map(|col| match inputs.remove(col.name.as_str()) {
            Some(value) => value,
            None => col.default.clone().unwrap_or(Value::Null),
        })
        .collect())
}

impl<T: Transaction> Executor<T> for Insert {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let table = txn.must_get_table(&self.table_name)?;
        let mut count = 0;
        let mut last_insert_id = None;
        for values in self.values {
            let row = if self.columns.is_empty() {
                pad_row(&table, values)?
            } else {
                make_row(&table, &self.columns, values)?
            };
            last_insert_id = Some(txn.insert_row(&table, row)?);
            count += 1;
        }
        debug!("inserted {} rows into {}", count, table.name);
        Ok(ResultSet::Insert { count, last_insert_id })
    }
}

/// Rows of a table matching an optional predicate, with the table's labels
fn matching_rows<T: Transaction + 'static>(
    txn: &mut T,
    table: &Table,
    predicate: Option<Expression>,
) -> Result<Vec<(RowId, Row)>> {
    let labels = table.labels(None);
    let rows = txn.scan_table(table)?;
    let Some(predicate) = predicate else {
        return Ok(rows);
    };
    let predicate = prepare(predicate, &labels, txn)?;
    let mut matched = Vec::new();
    for (id, row) in rows {
        if matches(&predicate, &labels, &row, txn)? {
            matched.push((id, row));
        }
    }
    Ok(matched)
}

/// UPDATE executor
pub struct Update {
    table_name: String,
    assignments: Vec<(String, Expression)>,
    predicate: Option<Expression>,
}

impl Update {
    pub fn new(
        table_name: String,
        assignments: Vec<(String, Expression)>,
        predicate: Option<Expression>,
    ) -> Box<Self> {
        Box::new(Self { table_name, assignments, predicate })
    }
}

impl<T: Transaction + 'static> Executor<T> for Update {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let table = txn.must_get_table(&self.table_name)?;
        let labels = table.labels(None);

        let mut assignments = Vec::with_capacity(self.assignments.len());
        for (column, expr) in self.assignments {
            assignments.push((table.get_col_index(&column)?, prepare(expr, &labels, txn)?));
        }

        // Assignments see the row as it was before the statement
        let rows = matching_rows(txn, &table, self.predicate)?;
        let count = rows.len();
        for (id, row) in rows {
            let mut new_row = row.clone();
            for (index, expr) in &assignments {
                new_row[*index] = evaluate(expr, &labels, &row, txn)?;
            }
            txn.update_row(&table, id, new_row)?;
        }
        debug!("updated {} rows in {}", count, table.name);
        Ok(ResultSet::Update { count })
    }
}

/// DELETE executor
pub struct Delete {
    table_name: String,
    predicate: Option<Expression>,
}

impl Delete {
    pub fn new(table_name: String, predicate: Option<Expression>) -> Box<Self> {
        Box::new(Self { table_name, predicate })
    }
}

impl<T: Transaction + 'static> Executor<T> for Delete {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let table = txn.must_get_table(&self.table_name)?;
        let rows = matching_rows(txn, &table, self.predicate)?;
        let count = rows.len();
        for (id, _) in rows {
            txn.delete_row(&table, id)?;
        }
        debug!("deleted {} rows from {}", count, table.name);
        Ok(ResultSet::Delete { count })
    }
}

use std::collections::HashSet;

use log::debug;

use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::{
            ResultSet,
            subquery::{evaluate, matches, prepare},
        },
        plan::{Expression, OrderDirection},
        types::Label,
    },
};

use super::{Executor, row_key};

/// Table scan executor
pub struct Scan {
    table_name: String,
    alias: Option<String>,
}

impl Scan {
    pub fn new(table_name: String, alias: Option<String>) -> Box<Self> {
        Box::new(Self { table_name, alias })
    }
}

impl<T: Transaction> Executor<T> for Scan {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let table = txn.must_get_table(&self.table_name)?;
        let rows = txn.scan_table(&table)?.into_iter().map(|(_, row)| row).collect();
        Ok(ResultSet::Query { columns: table.labels(self.alias.as_deref()), rows })
    }
}

/// WHERE executor - keeps rows whose predicate is true
pub struct Filter<T: Transaction> {
    source: Box<dyn Executor<T>>,
    predicate: Expression,
}

impl<T: Transaction> Filter<T> {
    pub fn new(source: Box<dyn Executor<T>>, predicate: Expression) -> Box<Self> {
        Box::new(Self { source, predicate })
    }
}

impl<T: Transaction + 'static> Executor<T> for Filter<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        match self.source.execute(txn)? {
            ResultSet::Query { columns, rows } => {
                let predicate = prepare(self.predicate, &columns, txn)?;
                let mut kept = Vec::new();
                for row in rows {
                    if matches(&predicate, &columns, &row, txn)? {
                        kept.push(row);
                    }
                }
                Ok(ResultSet::Query { columns, rows: kept })
            }
            _ => Err(Error::Internal("Unexpected result set".into())),
        }
    }
}

/// ORDER BY executor - sorts rows by the given expressions
pub struct Order<T: Transaction> {
    source: Box<dyn Executor<T>>,
    order_by: Vec<(Expression, OrderDirection)>,
}

impl<T: Transaction> Order<T> {
    pub fn new(
        source: Box<dyn Executor<T>>,
        order_by: Vec<(Expression, OrderDirection)>,
    ) -> Box<Self> {
        Box::new(Self { source, order_by })
    }
}

impl<T: Transaction + 'static> Executor<T> for Order<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        match self.source.execute(txn)? {
            ResultSet::Query { columns, rows } => {
                let mut order_by = Vec::with_capacity(self.order_by.len());
                for (expr, direction) in self.order_by {
                    order_by.push((prepare(expr, &columns, txn)?, direction));
                }

                // Evaluate sort keys up front, sorting can't fail
                let mut keyed = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut keys = Vec::with_capacity(order_by.len());
                    for (expr, _) in &order_by {
                        keys.push(evaluate(expr, &columns, &row, txn)?);
                    }
                    keyed.push((keys, row));
                }

                // Multi-column stable sort: on Equal continue to the next key,
                // otherwise apply the ASC/DESC direction
                keyed.sort_by(|(a, _), (b, _)| {
                    for (i, (_, direction)) in order_by.iter().enumerate() {
                        let ordering = a[i].sort_cmp(&b[i]);
                        if ordering.is_ne() {
                            return match direction {
                                OrderDirection::Asc => ordering,
                                OrderDirection::Desc => ordering.reverse(),
                            };
                        }
                    }
                    std::cmp::Ordering::Equal
                });

                Ok(ResultSet::Query { columns, rows: keyed.into_iter().map(|(_, r)| r).collect() })
            }
            _ => Err(Error::Internal("Unexpected result set".into())),
        }
    }
}

/// LIMIT executor - restricts the number of rows returned
pub struct Limit<T: Transaction> {
    source: Box<dyn Executor<T>>,
    limit: usize,
}

impl<T: Transaction> Limit<T> {
    pub fn new(source: Box<dyn Executor<T>>, limit: usize) -> Box<Self> {
        Box::new(Self { source, limit })
    }
}

impl<T: Transaction> Executor<T> for Limit<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        match self.source.execute(txn)? {
            ResultSet::Query { columns, rows } => Ok(ResultSet::Query {
                columns,
                rows: rows.into_iter().take(self.limit).collect(),
            }),
            _ => Err(Error::Internal("Unexpected result set".into())),
        }
    }
}

/// OFFSET executor - skips the first N rows
pub struct Offset<T: Transaction> {
    source: Box<dyn Executor<T>>,
    offset: usize,
}

impl<T: Transaction> Offset<T> {
    pub fn new(source: Box<dyn Executor<T>>, offset: usize) -> Box<Self> {
        Box::new(Self { source, offset })
    }
}

impl<T: Transaction> Executor<T> for Offset<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        match self.source.execute(txn)? {
            ResultSet::Query { columns, rows } => Ok(ResultSet::Query {
                columns,
                rows: rows.into_iter().skip(self.offset).collect(),
            }),
            _ => Err(Error::Internal("Unexpected result set".into())),
        }
    }
}

/// Projection executor - computes the output columns
pub struct Projection<T: Transaction> {
    source: Box<dyn Executor<T>>,
    exprs: Vec<(Expression, Option<String>)>,
}

impl<T: Transaction> Projection<T> {
    pub fn new(source: Box<dyn Executor<T>>, exprs: Vec<(Expression, Option<String>)>) -> Box<Self> {
        Box::new(Self { source, exprs })
    }
}

impl<T: Transaction + 'static> Executor<T> for Projection<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        match self.source.execute(txn)? {
            ResultSet::Query { columns, rows } => {
                let mut labels = Vec::with_capacity(self.exprs.len());
                let mut exprs = Vec::with_capacity(self.exprs.len());
                for (expr, alias) in self.exprs {
                    let prepared = prepare(expr.clone(), &columns, txn)?;
                    // Plain columns keep their (qualified) source label
                    labels.push(match (alias, &prepared) {
                        (Some(alias), _) => Label::new(alias),
                        (None, Expression::Column(i)) => columns[*i].clone(),
                        (None, _) => Label::new(expr.to_string()),
                    });
                    exprs.push(prepared);
                }

                let mut projected = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut values = Vec::with_capacity(exprs.len());
                    for expr in &exprs {
                        values.push(evaluate(expr, &columns, &row, txn)?);
                    }
                    projected.push(values);
                }
                Ok(ResultSet::Query { columns: labels, rows: projected })
            }
            _ => Err(Error::Internal("Unexpected result set".into())),
        }
    }
}

/// DISTINCT executor - drops repeated rows, keeping first occurrences
pub struct Distinct<T: Transaction> {
    source: Box<dyn Executor<T>>,
}

impl<T: Transaction> Distinct<T> {
    pub fn new(source: Box<dyn Executor<T>>) -> Box<Self> {
        Box::new(Self { source })
    }
}

impl<T: Transaction> Executor<T> for Distinct<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        match self.source.execute(txn)? {
            ResultSet::Query { columns, rows } => {
                let total = rows.len();
                let mut seen = HashSet::new();
                let mut unique = Vec::new();
                for row in rows {
                    if seen.insert(row_key(&row)?) {
                        unique.push(row);
                    }
                }
                debug!("distinct kept {} of {} rows", unique.len(), total);
                Ok(ResultSet::Query { columns, rows: unique })
            }
            _ => Err(Error::Internal("Unexpected result set".into())),
        }
    }
}

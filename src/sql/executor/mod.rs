use crate::{
    error::Result,
    sql::{
        engine::Transaction,
        executor::{
            agg::Aggregate,
            join::NestedLoopJoin,
            mutation::{Delete, Insert, Update},
            query::{Distinct, Filter, Limit, Offset, Order, Projection, Scan},
            schema::{CreateTable, DropTable},
        },
        plan::Node,
        types::{Label, Row, RowId, Value},
    },
    storage::keycode,
};

mod agg;
mod join;
mod mutation;
mod query;
mod schema;
mod subquery;

/// SQL executor trait
pub trait Executor<T: Transaction> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet>;
}

/// Builds an executor from a plan node
///
/// The `'static` bound is required for trait object usage in recursive executor building.
impl<T: Transaction + 'static> dyn Executor<T> {
    pub fn build(node: Node) -> Box<dyn Executor<T>> {
        match node {
            Node::CreateTable { schema, if_not_exists } => CreateTable::new(schema, if_not_exists),
            Node::DropTable { table_name, if_exists } => DropTable::new(table_name, if_exists),
            Node::Insert { table_name, columns, values } => Insert::new(table_name, columns, values),
            Node::Update { table_name, assignments, predicate } => {
                Update::new(table_name, assignments, predicate)
            }
            Node::Delete { table_name, predicate } => Delete::new(table_name, predicate),
            Node::Scan { table_name, alias } => Scan::new(table_name, alias),
            Node::Filter { source, predicate } => Filter::new(Self::build(*source), predicate),
            Node::Join { left, right, join_type, predicate } => {
                NestedLoopJoin::new(Self::build(*left), Self::build(*right), join_type, predicate)
            }
            Node::Aggregate { source, group_by, aggregates } => {
                Aggregate::new(Self::build(*source), group_by, aggregates)
            }
            Node::Order { source, order_by } => Order::new(Self::build(*source), order_by),
            Node::Limit { source, limit } => Limit::new(Self::build(*source), limit),
            Node::Offset { source, offset } => Offset::new(Self::build(*source), offset),
            Node::Projection { source, exprs } => Projection::new(Self::build(*source), exprs),
            Node::Distinct { source } => Distinct::new(Self::build(*source)),
        }
    }
}

/// Encodes values so that rows equal under SQL comparison share a key:
/// integral reals collapse onto the matching integer.
fn row_key(values: &[Value]) -> Result<Vec<u8>> {
    let normalized: Vec<Value> = values
        .iter()
        .map(|v| match v {
            Value::Real(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 => {
                Value::Integer(*f as i64)
            }
            v => v.clone(),
        })
        .collect();
    keycode::serialize_key(&normalized)
}

/// Execution result set
#[derive(Debug, PartialEq)]
pub enum ResultSet {
    CreateTable { table_name: String },
    DropTable { table_name: String },
    Insert { count: usize, last_insert_id: Option<RowId> },
    Update { count: usize },
    Delete { count: usize },
    Query { columns: Vec<Label>, rows: Vec<Row> },
}

impl ResultSet {
    /// Number of rows inserted, updated or deleted
    pub fn changes(&self) -> usize {
        match self {
            Self::Insert { count, .. } | Self::Update { count } | Self::Delete { count } => *count,
            _ => 0,
        }
    }

    /// Row id of the last inserted row
    pub fn last_insert_id(&self) -> Option<RowId> {
        match self {
            Self::Insert { last_insert_id, .. } => *last_insert_id,
            _ => None,
        }
    }

    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Query { rows, .. } => rows,
            _ => &[],
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Query { rows, .. } => rows,
            _ => Vec::new(),
        }
    }

    /// Unqualified output column names
    pub fn column_names(&self) -> Vec<String> {
        match self {
            Self::Query { columns, .. } => columns.iter().map(|c| c.name.clone()).collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::row_key;
    use crate::{error::Result, sql::types::Value};

    #[test]
    fn test_row_key() -> Result<()> {
        assert_eq!(row_key(&[Value::Integer(1)])?, row_key(&[Value::Real(1.0)])?);
        assert_eq!(row_key(&[Value::Integer(0)])?, row_key(&[Value::Real(-0.0)])?);
        assert_ne!(row_key(&[Value::Integer(1)])?, row_key(&[Value::Real(1.5)])?);
        assert_ne!(row_key(&[Value::Integer(1)])?, row_key(&[Value::from("1")])?);
        assert_ne!(row_key(&[Value::Null])?, row_key(&[Value::Integer(0)])?);
        Ok(())
    }
}

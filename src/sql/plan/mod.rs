use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    sql::{
        engine::Transaction,
        executor::{Executor, ResultSet},
        schema::Table,
        types::Row,
    },
};

mod expression;

pub use expression::{Expression, LikePattern, lookup_column};

/// Logical plan node
///
/// Plans are built by the caller (a SQL front-end, or by hand with the
/// builder methods below) and executed depth-first. A node owns no table
/// data and is consumed by execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
    CreateTable {
        schema: Table,
        if_not_exists: bool,
    },
    DropTable {
        table_name: String,
        if_exists: bool,
    },
    Insert {
        table_name: String,
        /// Target columns; empty means all columns in table order
        columns: Vec<String>,
        values: Vec<Row>,
    },
    Update {
        table_name: String,
        assignments: Vec<(String, Expression)>,
        predicate: Option<Expression>,
    },
    Delete {
        table_name: String,
        predicate: Option<Expression>,
    },
    Scan {
        table_name: String,
        alias: Option<String>,
    },
    Filter {
        source: Box<Node>,
        predicate: Expression,
    },
    Join {
        left: Box<Node>,
        right: Box<Node>,
        join_type: JoinType,
        /// Join ON condition (None for CROSS JOIN)
        predicate: Option<Expression>,
    },
    Aggregate {
        source: Box<Node>,
        /// Empty means the whole input is one group
        group_by: Vec<Expression>,
        aggregates: Vec<(Aggregate, Option<String>)>,
    },
    Order {
        source: Box<Node>,
        order_by: Vec<(Expression, OrderDirection)>,
    },
    Limit {
        source: Box<Node>,
        limit: usize,
    },
    Offset {
        source: Box<Node>,
        offset: usize,
    },
    Projection {
        source: Box<Node>,
        exprs: Vec<(Expression, Option<String>)>,
    },
    Distinct {
        source: Box<Node>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum JoinType {
    Cross,
    Inner,
    Left,
    Right,
}

/// Sort direction (ascending or descending)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// Aggregate functions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    /// COUNT(expr): non-null values
    Count(Expression),
    /// COUNT(*): rows
    CountAll,
    Sum(Expression),
    Avg(Expression),
    Min(Expression),
    Max(Expression),
}

impl Aggregate {
    /// Default output column name, the lower-case function name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count(_) | Self::CountAll => "count",
            Self::Sum(_) => "sum",
            Self::Avg(_) => "avg",
            Self::Min(_) => "min",
            Self::Max(_) => "max",
        }
    }

    pub fn argument(&self) -> Option<&Expression> {
        match self {
            Self::CountAll => None,
            Self::Count(e) | Self::Sum(e) | Self::Avg(e) | Self::Min(e) | Self::Max(e) => Some(e),
        }
    }

    fn map_argument<F>(self, f: &mut F) -> Result<Self>
    where
        F: FnMut(Expression) -> Result<Expression>,
    {
        Ok(match self {
            Self::CountAll => Self::CountAll,
            Self::Count(e) => Self::Count(f(e)?),
            Self::Sum(e) => Self::Sum(f(e)?),
            Self::Avg(e) => Self::Avg(f(e)?),
            Self::Min(e) => Self::Min(f(e)?),
            Self::Max(e) => Self::Max(f(e)?),
        })
    }
}

/// Execution plan
pub struct Plan(pub Node);

impl Plan {
    pub fn execute<T: Transaction + 'static>(self, txn: &mut T) -> Result<ResultSet> {
        <dyn Executor<T>>::build(self.0).execute(txn)
    }
}

impl Node {
    /// Whether the plan only reads (no DDL or row mutation).
    pub fn is_query(&self) -> bool {
        !matches!(
            self,
            Self::CreateTable { .. }
                | Self::DropTable { .. }
                | Self::Insert { .. }
                | Self::Update { .. }
                | Self::Delete { .. }
        )
    }

    /// Applies the closure to every expression of this query level,
    /// including its sources. Plans nested in subquery expressions are left
    /// alone, their expressions belong to another level.
    pub fn transform_expressions<F>(self, f: &mut F) -> Result<Self>
    where
        F: FnMut(Expression) -> Result<Expression>,
    {
        let source = |node: Box<Node>, f: &mut F| -> Result<Box<Node>> {
            Ok(Box::new(node.transform_expressions(f)?))
        };
        Ok(match self {
            n @ (Self::CreateTable { .. }
            | Self::DropTable { .. }
            | Self::Insert { .. }
            | Self::Scan { .. }) => n,
            Self::Update { table_name, assignments, predicate } => Self::Update {
                table_name,
                assignments: assignments
                    .into_iter()
                    .map(|(c, e)| Ok((c, f(e)?)))
                    .collect::<Result<_>>()?,
                predicate: predicate.map(&mut *f).transpose()?,
            },
            Self::Delete { table_name, predicate } => {
                Self::Delete { table_name, predicate: predicate.map(&mut *f).transpose()? }
            }
            Self::Filter { source: s, predicate } => {
                Self::Filter { source: source(s, f)?, predicate: f(predicate)? }
            }
            Self::Join { left, right, join_type, predicate } => Self::Join {
                left: source(left, f)?,
                right: source(right, f)?,
                join_type,
                predicate: predicate.map(&mut *f).transpose()?,
            },
            Self::Aggregate { source: s, group_by, aggregates } => Self::Aggregate {
                source: source(s, f)?,
                group_by: group_by.into_iter().map(&mut *f).collect::<Result<_>>()?,
                aggregates: aggregates
                    .into_iter()
                    .map(|(a, alias)| Ok((a.map_argument(f)?, alias)))
                    .collect::<Result<_>>()?,
            },
            Self::Order { source: s, order_by } => Self::Order {
                source: source(s, f)?,
                order_by: order_by
                    .into_iter()
                    .map(|(e, d)| Ok((f(e)?, d)))
                    .collect::<Result<_>>()?,
            },
            Self::Limit { source: s, limit } => Self::Limit { source: source(s, f)?, limit },
            Self::Offset { source: s, offset } => Self::Offset { source: source(s, f)?, offset },
            Self::Projection { source: s, exprs } => Self::Projection {
                source: source(s, f)?,
                exprs: exprs
                    .into_iter()
                    .map(|(e, alias)| Ok((f(e)?, alias)))
                    .collect::<Result<_>>()?,
            },
            Self::Distinct { source: s } => Self::Distinct { source: source(s, f)? },
        })
    }

    /// Collects references to every expression of this query level.
    fn expressions(&self) -> Vec<&Expression> {
        let mut exprs = Vec::new();
        let mut sources: Vec<&Node> = Vec::new();
        match self {
            Self::CreateTable { .. }
            | Self::DropTable { .. }
            | Self::Insert { .. }
            | Self::Scan { .. } => {}
            Self::Update { assignments, predicate, .. } => {
                exprs.extend(assignments.iter().map(|(_, e)| e));
                exprs.extend(predicate);
            }
            Self::Delete { predicate, .. } => exprs.extend(predicate),
            Self::Filter { source, predicate } => {
                sources.push(source);
                exprs.push(predicate);
            }
            Self::Join { left, right, predicate, .. } => {
                sources.push(left);
                sources.push(right);
                exprs.extend(predicate);
            }
            Self::Aggregate { source, group_by, aggregates } => {
                sources.push(source);
                exprs.extend(group_by);
                exprs.extend(aggregates.iter().filter_map(|(a, _)| a.argument()));
            }
            Self::Order { source, order_by } => {
                sources.push(source);
                exprs.extend(order_by.iter().map(|(e, _)| e));
            }
            Self::Projection { source, exprs: projected } => {
                sources.push(source);
                exprs.extend(projected.iter().map(|(e, _)| e));
            }
            Self::Limit { source, .. } | Self::Offset { source, .. } | Self::Distinct { source } => {
                sources.push(source)
            }
        }
        for source in sources {
            exprs.extend(source.expressions());
        }
        exprs
    }

    /// Whether the plan refers to the enclosing query's row.
    pub fn is_correlated(&self) -> bool {
        self.expressions()
            .into_iter()
            .any(|e| e.contains(&mut |e| matches!(e, Expression::OuterField(..))))
    }
}

/// Builders for composing plans by hand
impl Node {
    pub fn create_table(schema: Table, if_not_exists: bool) -> Self {
        Self::CreateTable { schema, if_not_exists }
    }

    pub fn drop_table(table_name: &str, if_exists: bool) -> Self {
        Self::DropTable { table_name: table_name.to_string(), if_exists }
    }

    pub fn insert(table_name: &str, columns: &[&str], values: Vec<Row>) -> Self {
        Self::Insert {
            table_name: table_name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            values,
        }
    }

    pub fn update(
        table_name: &str,
        assignments: Vec<(&str, Expression)>,
        predicate: Option<Expression>,
    ) -> Self {
        Self::Update {
            table_name: table_name.to_string(),
            assignments: assignments.into_iter().map(|(c, e)| (c.to_string(), e)).collect(),
            predicate,
        }
    }

    pub fn delete(table_name: &str, predicate: Option<Expression>) -> Self {
        Self::Delete { table_name: table_name.to_string(), predicate }
    }

    pub fn scan(table_name: &str) -> Self {
        Self::Scan { table_name: table_name.to_string(), alias: None }
    }

    pub fn scan_as(table_name: &str, alias: &str) -> Self {
        Self::Scan { table_name: table_name.to_string(), alias: Some(alias.to_string()) }
    }

    pub fn filter(self, predicate: Expression) -> Self {
        Self::Filter { source: Box::new(self), predicate }
    }

    pub fn join(self, right: Node, join_type: JoinType, predicate: Option<Expression>) -> Self {
        Self::Join { left: Box::new(self), right: Box::new(right), join_type, predicate }
    }

    pub fn aggregate(
        self,
        group_by: Vec<Expression>,
        aggregates: Vec<(Aggregate, Option<&str>)>,
    ) -> Self {
        Self::Aggregate {
            source: Box::new(self),
            group_by,
            aggregates: aggregates.into_iter().map(|(a, alias)| (a, alias.map(String::from))).collect(),
        }
    }

    pub fn order_by(self, order_by: Vec<(Expression, OrderDirection)>) -> Self {
        Self::Order { source: Box::new(self), order_by }
    }

    pub fn limit(self, limit: usize) -> Self {
        Self::Limit { source: Box::new(self), limit }
    }

    pub fn offset(self, offset: usize) -> Self {
        Self::Offset { source: Box::new(self), offset }
    }

    /// Projects fields by name
    pub fn select(self, fields: &[&str]) -> Self {
        self.project(fields.iter().map(|f| (field_expr(f), None)).collect())
    }

    pub fn project(self, exprs: Vec<(Expression, Option<String>)>) -> Self {
        Self::Projection { source: Box::new(self), exprs }
    }

    pub fn distinct(self) -> Self {
        Self::Distinct { source: Box::new(self) }
    }
}

/// Parses "table.column" or "column" into a field expression.
fn field_expr(field: &str) -> Expression {
    match field.split_once('.') {
        Some((table, name)) => Expression::qualified(table, name),
        None => Expression::field(field),
    }
}

#[cfg(test)]
mod tests {
    use super::{Aggregate, Expression, Node, OrderDirection};

    #[test]
    fn test_correlation() {
        let avg = Node::scan("students")
            .filter(Expression::field("name").equal(Expression::outer(Some("s"), "name")))
            .aggregate(vec![], vec![(Aggregate::Avg(Expression::field("grade")), None)]);
        assert!(avg.is_correlated());

        let plain = Node::scan("students")
            .aggregate(vec![], vec![(Aggregate::Avg(Expression::field("grade")), None)]);
        assert!(!plain.is_correlated());

        // An outer reference inside a nested subquery belongs to that subquery
        let nested = Node::scan("grades").filter(Expression::subquery(avg.clone()).gt(Expression::constant(1i64)));
        assert!(!nested.is_correlated());
    }

    #[test]
    fn test_select_builder() {
        let node = Node::scan_as("students", "s")
            .order_by(vec![(Expression::field("age"), OrderDirection::Desc)])
            .select(&["s.name", "age"]);
        match node {
            Node::Projection { exprs, .. } => assert_eq!(
                exprs,
                vec![
                    (Expression::qualified("s", "name"), None),
                    (Expression::field("age"), None)
                ]
            ),
            n => panic!("unexpected node {:?}", n),
        }
    }
}

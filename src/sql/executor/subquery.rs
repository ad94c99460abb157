use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::{Executor, ResultSet},
        plan::{Expression, Node},
        types::{Label, Row, Value},
    },
};

fn subquery_plan(expr: &Expression) -> Option<&Node> {
    match expr {
        Expression::Subquery(node) | Expression::InSubquery(_, node) | Expression::Exists(node) => {
            Some(node)
        }
        _ => None,
    }
}

fn run<T: Transaction + 'static>(node: Node, txn: &mut T) -> Result<(Vec<Label>, Vec<Row>)> {
    match <dyn Executor<T>>::build(node).execute(txn)? {
        ResultSet::Query { columns, rows } => Ok((columns, rows)),
        _ => Err(Error::Internal("Unexpected result set".into())),
    }
}

/// Values of a single-column subquery result
fn column_values<T: Transaction + 'static>(node: Node, txn: &mut T) -> Result<Vec<Value>> {
    let (columns, rows) = run(node, txn)?;
    if columns.len() != 1 {
        return Err(Error::Query(format!(
            "subquery returns {} columns, expected 1",
            columns.len()
        )));
    }
    Ok(rows.into_iter().filter_map(|row| row.into_iter().next()).collect())
}

/// Runs the subquery of an expression node and replaces it with its result.
fn substitute<T: Transaction + 'static>(expr: Expression, txn: &mut T) -> Result<Expression> {
    Ok(match expr {
        Expression::Subquery(node) => {
            Expression::Constant(column_values(*node, txn)?.into_iter().next().unwrap_or(Value::Null))
        }
        Expression::InSubquery(lhs, node) => Expression::InList(
            lhs,
            column_values(*node, txn)?.into_iter().map(Expression::Constant).collect(),
        ),
        Expression::Exists(node) => {
            let (_, rows) = run(*node, txn)?;
            Expression::Constant(Value::Boolean(!rows.is_empty()))
        }
        expr => expr,
    })
}

/// Substitutes the enclosing row's values into a correlated subquery.
fn bind_outer(expr: Expression, labels: &[Label], row: &[Value]) -> Result<Expression> {
    let bind = |node: Box<Node>| -> Result<Box<Node>> {
        Ok(Box::new(node.transform_expressions(&mut |e| e.bind_outer(labels, row))?))
    };
    Ok(match expr {
        Expression::Subquery(node) => Expression::Subquery(bind(node)?),
        Expression::InSubquery(lhs, node) => Expression::InSubquery(lhs, bind(node)?),
        Expression::Exists(node) => Expression::Exists(bind(node)?),
        expr => expr,
    })
}

/// Prepares an expression for evaluation over rows with the given labels.
///
/// Uncorrelated subqueries are executed once and replaced with constants.
/// Correlated ones stay in place and run per row in `evaluate`.
pub fn prepare<T: Transaction + 'static>(
    expr: Expression,
    labels: &[Label],
    txn: &mut T,
) -> Result<Expression> {
    expr.transform(&mut |e| match subquery_plan(&e).map(Node::is_correlated) {
        Some(false) => substitute(e, txn),
        _ => Ok(e),
    })?
    .resolve_fields(labels)
}

/// Evaluates a prepared expression against a row.
pub fn evaluate<T: Transaction + 'static>(
    expr: &Expression,
    labels: &[Label],
    row: &[Value],
    txn: &mut T,
) -> Result<Value> {
    if !expr.has_subquery() {
        return expr.evaluate(row);
    }
    expr.clone()
        .transform(&mut |e| {
            if subquery_plan(&e).is_some() {
                substitute(bind_outer(e, labels, row)?, txn)
            } else {
                Ok(e)
            }
        })?
        .evaluate(row)
}

/// Evaluates a prepared predicate: NULL and false both reject the row.
pub fn matches<T: Transaction + 'static>(
    predicate: &Expression,
    labels: &[Label],
    row: &[Value],
    txn: &mut T,
) -> Result<bool> {
    match evaluate(predicate, labels, row, txn)? {
        Value::Boolean(b) => Ok(b),
        Value::Null => Ok(false),
        v => Err(Error::Query(format!("predicate returned non-boolean {}", v))),
    }
}

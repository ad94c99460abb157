use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::subquery::{matches, prepare},
        plan::{Expression, JoinType},
        types::{Label, Row, Value},
    },
};

use super::{Executor, ResultSet};

/// Nested Loop Join executor
///
/// Output rows are the left columns followed by the right columns. A RIGHT
/// join loops over the right input on the outside, so the right side's row
/// order is kept.
pub struct NestedLoopJoin<T: Transaction> {
    left: Box<dyn Executor<T>>,
    right: Box<dyn Executor<T>>,
    join_type: JoinType,
    predicate: Option<Expression>,
}

impl<T: Transaction> NestedLoopJoin<T> {
    pub fn new(
        left: Box<dyn Executor<T>>,
        right: Box<dyn Executor<T>>,
        join_type: JoinType,
        predicate: Option<Expression>,
    ) -> Box<Self> {
        Box::new(Self { left, right, join_type, predicate })
    }
}

fn query_result(result: ResultSet) -> Result<(Vec<Label>, Vec<Row>)> {
    match result {
        ResultSet::Query { columns, rows } => Ok((columns, rows)),
        _ => Err(Error::Internal("Unexpected result set".into())),
    }
}

impl<T: Transaction + 'static> Executor<T> for NestedLoopJoin<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (lcols, lrows) = query_result(self.left.execute(txn)?)?;
        let (rcols, rrows) = query_result(self.right.execute(txn)?)?;
        let (lwidth, rwidth) = (lcols.len(), rcols.len());

        let mut columns = lcols;
        columns.extend(rcols);
        let predicate = match self.predicate {
            Some(predicate) => Some(prepare(predicate, &columns, txn)?),
            None => None,
        };

        let right_outer = self.join_type == JoinType::Right;
        let (outer_rows, inner_rows) =
            if right_outer { (&rrows, &lrows) } else { (&lrows, &rrows) };
        let outer_join = matches!(self.join_type, JoinType::Left | JoinType::Right);

        let mut rows = Vec::new();
        for outer in outer_rows {
            let mut matched = false;
            for inner in inner_rows {
                let (l, r) = if right_outer { (inner, outer) } else { (outer, inner) };
                let mut row = Vec::with_capacity(lwidth + rwidth);
                row.extend(l.iter().cloned());
                row.extend(r.iter().cloned());

                // No predicate means CROSS JOIN
                let keep = match &predicate {
                    Some(predicate) => matches(predicate, &columns, &row, txn)?,
                    None => true,
                };
                if keep {
                    rows.push(row);
                    matched = true;
                }
            }

            // For outer joins, fill the other side with NULL if no match found
            if outer_join && !matched {
                let row = if right_outer {
                    std::iter::repeat_n(Value::Null, lwidth).chain(outer.iter().cloned()).collect()
                } else {
                    outer.iter().cloned().chain(std::iter::repeat_n(Value::Null, rwidth)).collect()
                };
                rows.push(row);
            }
        }

        Ok(ResultSet::Query { columns, rows })
    }
}

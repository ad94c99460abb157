use std::collections::HashMap;

use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::subquery::{evaluate, prepare},
        plan::{self, Expression},
        types::{Label, Value},
    },
};

use super::{Executor, ResultSet, row_key};

/// Aggregate executor - groups rows and computes aggregate functions
/// (COUNT, SUM, MIN, MAX, AVG)
pub struct Aggregate<T: Transaction> {
    source: Box<dyn Executor<T>>,
    group_by: Vec<Expression>,
    aggregates: Vec<(plan::Aggregate, Option<String>)>,
}

impl<T: Transaction> Aggregate<T> {
    pub fn new(
        source: Box<dyn Executor<T>>,
        group_by: Vec<Expression>,
        aggregates: Vec<(plan::Aggregate, Option<String>)>,
    ) -> Box<Self> {
        Box::new(Self { source, group_by, aggregates })
    }
}

/// A group: its key values and one calculator per aggregate
struct Group {
    key: Vec<Value>,
    calculators: Vec<Box<dyn Calculator>>,
}

impl<T: Transaction + 'static> Executor<T> for Aggregate<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let ResultSet::Query { columns, rows } = self.source.execute(txn)? else {
            return Err(Error::Internal("Unexpected result set".into()));
        };

        // Output labels: group expressions, then aggregates by alias or name
        let mut labels = Vec::new();
        let mut group_by = Vec::with_capacity(self.group_by.len());
        for expr in self.group_by {
            let prepared = prepare(expr.clone(), &columns, txn)?;
            labels.push(match &prepared {
                Expression::Column(i) => columns[*i].clone(),
                _ => Label::new(expr.to_string()),
            });
            group_by.push(prepared);
        }
        let mut arguments = Vec::with_capacity(self.aggregates.len());
        for (aggregate, alias) in &self.aggregates {
            labels.push(Label::new(alias.clone().unwrap_or_else(|| aggregate.name().to_string())));
            arguments.push(match aggregate.argument() {
                Some(arg) => Some(prepare(arg.clone(), &columns, txn)?),
                None => None,
            });
        }
        let new_calculators = || -> Vec<Box<dyn Calculator>> {
            self.aggregates.iter().map(|(a, _)| <dyn Calculator>::build(a)).collect()
        };

        // Groups in first-seen order
        let mut groups: Vec<Group> = Vec::new();
        let mut positions: HashMap<Vec<u8>, usize> = HashMap::new();
        if group_by.is_empty() {
            groups.push(Group { key: Vec::new(), calculators: new_calculators() });
            positions.insert(Vec::new(), 0);
        }

        for row in &rows {
            let mut key = Vec::with_capacity(group_by.len());
            for expr in &group_by {
                key.push(evaluate(expr, &columns, row, txn)?);
            }
            let encoded = row_key(&key)?;
            let index = match positions.get(&encoded) {
                Some(index) => *index,
                None => {
                    groups.push(Group { key, calculators: new_calculators() });
                    positions.insert(encoded, groups.len() - 1);
                    groups.len() - 1
                }
            };
            for (calculator, argument) in groups[index].calculators.iter_mut().zip(&arguments) {
                let value = match argument {
                    Some(argument) => evaluate(argument, &columns, row, txn)?,
                    None => Value::Boolean(true),
                };
                calculator.add(value)?;
            }
        }

        let mut out = Vec::with_capacity(groups.len());
        for group in groups {
            let mut row = group.key;
            for calculator in &group.calculators {
                row.push(calculator.value()?);
            }
            out.push(row);
        }
        Ok(ResultSet::Query { columns: labels, rows: out })
    }
}

/// Trait for aggregate function calculations
///
/// Values are fed one row at a time; NULLs are skipped by every function.
pub trait Calculator {
    fn add(&mut self, value: Value) -> Result<()>;
    fn value(&self) -> Result<Value>;
}

impl dyn Calculator {
    /// Runtime dispatch to appropriate calculator based on the aggregate
    pub fn build(aggregate: &plan::Aggregate) -> Box<dyn Calculator> {
        match aggregate {
            plan::Aggregate::Count(_) | plan::Aggregate::CountAll => Count::new(),
            plan::Aggregate::Sum(_) => Sum::new(),
            plan::Aggregate::Avg(_) => Avg::new(),
            plan::Aggregate::Min(_) => Extreme::new(false),
            plan::Aggregate::Max(_) => Extreme::new(true),
        }
    }
}

/// COUNT - counts non-null values
pub struct Count {
    count: i64,
}

impl Count {
    fn new() -> Box<Self> {
        Box::new(Self { count: 0 })
    }
}

impl Calculator for Count {
    fn add(&mut self, value: Value) -> Result<()> {
        if !value.is_null() {
            self.count += 1;
        }
        Ok(())
    }

    fn value(&self) -> Result<Value> {
        Ok(Value::Integer(self.count))
    }
}

/// MIN/MAX - keeps the smallest or largest value
pub struct Extreme {
    max: bool,
    current: Option<Value>,
}

impl Extreme {
    fn new(max: bool) -> Box<Self> {
        Box::new(Self { max, current: None })
    }
}

impl Calculator for Extreme {
    fn add(&mut self, value: Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        let replace = match &self.current {
            None => true,
            Some(current) => {
                let ordering = value.sort_cmp(current);
                if self.max { ordering.is_gt() } else { ordering.is_lt() }
            }
        };
        if replace {
            self.current = Some(value);
        }
        Ok(())
    }

    fn value(&self) -> Result<Value> {
        Ok(self.current.clone().unwrap_or(Value::Null))
    }
}

/// SUM - integer while all inputs are integers, real otherwise
pub struct Sum {
    sum: Option<Value>,
}

impl Sum {
    fn new() -> Box<Self> {
        Box::new(Self { sum: None })
    }
}

impl Calculator for Sum {
    fn add(&mut self, value: Value) -> Result<()> {
        self.sum = match (self.sum.take(), value) {
            (sum, Value::Null) => sum,
            (None, v @ (Value::Integer(_) | Value::Real(_))) => Some(v),
            (Some(Value::Integer(s)), Value::Integer(v)) => Some(Value::Integer(
                s.checked_add(v).ok_or_else(|| Error::Query("integer overflow".into()))?,
            )),
            (Some(Value::Integer(s)), Value::Real(v)) => Some(Value::Real(s as f64 + v)),
            (Some(Value::Real(s)), Value::Integer(v)) => Some(Value::Real(s + v as f64)),
            (Some(Value::Real(s)), Value::Real(v)) => Some(Value::Real(s + v)),
            (_, v) => return Err(Error::Query(format!("can't sum {}", v))),
        };
        Ok(())
    }

    fn value(&self) -> Result<Value> {
        Ok(self.sum.clone().unwrap_or(Value::Null))
    }
}

/// AVG - real average of the non-null values
pub struct Avg {
    sum: f64,
    count: usize,
}

impl Avg {
    fn new() -> Box<Self> {
        Box::new(Self { sum: 0.0, count: 0 })
    }
}

impl Calculator for Avg {
    fn add(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Null => {}
            Value::Integer(v) => {
                self.sum += v as f64;
                self.count += 1;
            }
            Value::Real(v) => {
                self.sum += v;
                self.count += 1;
            }
            v => return Err(Error::Query(format!("can't average {}", v))),
        }
        Ok(())
    }

    fn value(&self) -> Result<Value> {
        // AVG = SUM / COUNT
        Ok(match self.count {
            0 => Value::Null,
            count => Value::Real(self.sum / count as f64),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Calculator;
    use crate::{
        error::{Error, Result},
        sql::{
            engine::{Engine, KVEngine},
            plan::{Aggregate, Expression, Node},
            schema::{Column, Table},
            types::{DataType, Value},
        },
        storage::memory::MemoryEngine,
    };

    fn calc(aggregate: Aggregate, values: Vec<Value>) -> Result<Value> {
        let mut calculator = <dyn Calculator>::build(&aggregate);
        for value in values {
            calculator.add(value)?;
        }
        calculator.value()
    }

    #[test]
    fn test_calculators() -> Result<()> {
        let arg = || Expression::field("x");
        let values = || vec![Value::Integer(3), Value::Null, Value::Integer(1), Value::Integer(2)];
        assert_eq!(calc(Aggregate::Count(arg()), values())?, Value::Integer(3));
        assert_eq!(calc(Aggregate::Sum(arg()), values())?, Value::Integer(6));
        assert_eq!(calc(Aggregate::Avg(arg()), values())?, Value::Real(2.0));
        assert_eq!(calc(Aggregate::Min(arg()), values())?, Value::Integer(1));
        assert_eq!(calc(Aggregate::Max(arg()), values())?, Value::Integer(3));
        assert_eq!(calc(Aggregate::Sum(arg()), vec![1i64.into(), 0.5.into()])?, Value::Real(1.5));
        assert_eq!(calc(Aggregate::Sum(arg()), vec![])?, Value::Null);
        assert_eq!(calc(Aggregate::Max(arg()), vec![Value::Null])?, Value::Null);
        assert!(matches!(calc(Aggregate::Sum(arg()), vec!["a".into()]), Err(Error::Query(_))));
        Ok(())
    }

    #[test]
    fn test_empty_input() -> Result<()> {
        let s = KVEngine::new(MemoryEngine::new()).session();
        s.create_table(
            Table::new(
                "t",
                vec![
                    Column::new("id", DataType::Integer).primary_key(),
                    Column::new("v", DataType::Integer),
                ],
            ),
            false,
        )?;

        let whole = s.execute(Node::scan("t").aggregate(
            vec![],
            vec![(Aggregate::CountAll, None), (Aggregate::Sum(Expression::field("v")), Some("total"))],
        ))?;
        assert_eq!(whole.column_names(), vec!["count", "total"]);
        assert_eq!(whole.into_rows(), vec![vec![Value::Integer(0), Value::Null]]);

        let grouped = s.execute(
            Node::scan("t").aggregate(vec![Expression::field("v")], vec![(Aggregate::CountAll, None)]),
        )?;
        assert_eq!(grouped.into_rows(), Vec::<Vec<Value>>::new());
        Ok(())
    }
}

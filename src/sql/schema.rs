use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    sql::{
        plan::Expression,
        types::{DataType, Label, Row, Value},
    },
};

/// Table schema definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(name: &str, columns: Vec<Column>) -> Self {
        Self { name: name.to_string(), columns, foreign_keys: Vec::new() }
    }

    /// Adds a FOREIGN KEY (column) REFERENCES parent_table(parent_column)
    pub fn foreign_key(mut self, column: &str, parent_table: &str, parent_column: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.to_string(),
            parent_table: parent_table.to_string(),
            parent_column: parent_column.to_string(),
        });
        self
    }

    /// Validates table schema
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::Schema(format!("table {} has no columns", self.name)));
        }

        let mut names = HashSet::new();
        for column in &self.columns {
            if !names.insert(column.name.as_str()) {
                return Err(Error::Schema(format!(
                    "duplicate column name {} in table {}",
                    column.name, self.name
                )));
            }
        }

        match self.columns.iter().filter(|c| c.primary_key).count() {
            1 => {}
            0 => return Err(Error::Schema(format!("no primary key for table {}", self.name))),
            _ => {
                return Err(Error::Schema(format!(
                    "multiple primary keys for table {}",
                    self.name
                )));
            }
        }

        let labels = self.labels(None);
        for column in &self.columns {
            if column.autoincrement && !(column.primary_key && column.datatype == DataType::Integer)
            {
                return Err(Error::Schema(format!(
                    "AUTOINCREMENT is only allowed on an INTEGER PRIMARY KEY, not {}.{}",
                    self.name, column.name
                )));
            }
            if let Some(default) = &column.default {
                column.coerce(default.clone()).map_err(|_| {
                    Error::Schema(format!(
                        "default value {} does not match type {} of column {}",
                        default, column.datatype, column.name
                    ))
                })?;
            }
            if let Some(check) = &column.check {
                if check.has_subquery() {
                    return Err(Error::Schema(format!(
                        "subqueries are not allowed in CHECK of column {}",
                        column.name
                    )));
                }
                check.clone().resolve_fields(&labels).map_err(|e| match e {
                    Error::Query(msg) => Error::Schema(msg),
                    e => e,
                })?;
            }
        }

        for fk in &self.foreign_keys {
            self.get_col_index(&fk.column)?;
            if fk.parent_table == self.name {
                self.get_col_index(&fk.parent_column)?;
            }
        }
        Ok(())
    }

    pub fn primary_key_index(&self) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.primary_key)
            .ok_or_else(|| Error::Schema(format!("no primary key for table {}", self.name)))
    }

    /// Extracts primary key value from a row
    pub fn get_primary_key<'a>(&self, row: &'a Row) -> Result<&'a Value> {
        let pos = self.primary_key_index()?;
        row.get(pos).ok_or_else(|| Error::Internal(format!("short row for table {}", self.name)))
    }

    /// Whether the primary key doubles as the row id (INTEGER PRIMARY KEY).
    pub fn is_rowid_alias(&self) -> bool {
        self.columns.iter().any(|c| c.primary_key && c.datatype == DataType::Integer)
    }

    pub fn is_autoincrement(&self) -> bool {
        self.columns.iter().any(|c| c.autoincrement)
    }

    /// Returns the column index for a given column name
    pub fn get_col_index(&self, col_name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == col_name)
            .ok_or_else(|| Error::Schema(format!("table {} has no column named {}", self.name, col_name)))
    }

    /// Labels of the table's columns, qualified by the alias or table name
    pub fn labels(&self, alias: Option<&str>) -> Vec<Label> {
        let qualifier = alias.unwrap_or(&self.name);
        self.columns.iter().map(|c| Label::qualified(qualifier, &c.name)).collect()
    }

    /// Coerces each value to its column's declared type.
    pub fn coerce_row(&self, row: Row) -> Result<Row> {
        if row.len() != self.columns.len() {
            return Err(Error::Internal(format!(
                "row has {} values, table {} has {} columns",
                row.len(),
                self.name,
                self.columns.len()
            )));
        }
        row.into_iter().zip(&self.columns).map(|(v, c)| c.coerce(v)).collect()
    }

    /// Checks NOT NULL and CHECK constraints of a coerced row.
    pub fn check_row(&self, row: &Row) -> Result<()> {
        for (column, value) in self.columns.iter().zip(row) {
            if value.is_null() && (!column.nullable || column.primary_key) {
                return Err(Error::Constraint(format!(
                    "NOT NULL constraint failed: {}.{}",
                    self.name, column.name
                )));
            }
        }

        let labels = self.labels(None);
        for column in &self.columns {
            let Some(check) = &column.check else { continue };
            match check.clone().resolve_fields(&labels)?.evaluate(row)? {
                Value::Boolean(true) | Value::Null => {}
                Value::Boolean(false) => {
                    return Err(Error::Constraint(format!(
                        "CHECK constraint failed: {}",
                        column.name
                    )));
                }
                v => {
                    return Err(Error::Query(format!(
                        "CHECK on column {} returned non-boolean {}",
                        column.name, v
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Column schema definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
    pub nullable: bool,
    pub default: Option<Value>,
    /// Whether this column is the primary key
    pub primary_key: bool,
    pub autoincrement: bool,
    /// Row predicate that must not be false
    pub check: Option<Expression>,
}

impl Column {
    pub fn new(name: &str, datatype: DataType) -> Self {
        Self {
            name: name.to_string(),
            datatype,
            nullable: true,
            default: None,
            primary_key: false,
            autoincrement: false,
            check: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn check(mut self, check: Expression) -> Self {
        self.check = Some(check);
        self
    }

    /// Converts a value to the column's declared type.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        let coerced = match (self.datatype, value) {
            (_, Value::Null) => Some(Value::Null),

            (DataType::Integer, Value::Integer(i)) => Some(Value::Integer(i)),
            (DataType::Integer, Value::Boolean(b)) => Some(Value::Integer(b as i64)),
            (DataType::Integer, Value::Real(f)) => integral(f),
            (DataType::Integer, Value::Text(s)) => {
                let s = s.trim();
                s.parse::<i64>().ok().map(Value::Integer).or_else(|| s.parse().ok().and_then(integral))
            }

            (DataType::Real, Value::Real(f)) => Some(Value::Real(f)),
            (DataType::Real, Value::Integer(i)) => Some(Value::Real(i as f64)),
            (DataType::Real, Value::Text(s)) => s.trim().parse().ok().map(Value::Real),

            (DataType::Text, Value::Text(s)) => Some(Value::Text(s)),
            (DataType::Text, v @ (Value::Integer(_) | Value::Real(_))) => {
                Some(Value::Text(v.to_string()))
            }

            (_, _) => None,
        };
        coerced.ok_or_else(|| {
            Error::Constraint(format!("datatype mismatch for column {}", self.name))
        })
    }
}

fn integral(f: f64) -> Option<Value> {
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then(|| Value::Integer(f as i64))
}

/// FOREIGN KEY (column) REFERENCES parent_table(parent_column)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub parent_table: String,
    pub parent_column: String,
}

#[cfg(test)]
mod tests {
    use super::{Column, Table};
    use crate::{
        error::{Error, Result},
        sql::{
            plan::Expression,
            types::{DataType, Value},
        },
    };

    fn grades() -> Table {
        Table::new(
            "grades",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("name", DataType::Text).not_null(),
                Column::new("subject", DataType::Text).check(Expression::field("subject").in_list(vec![
                    Expression::constant("math"),
                    Expression::constant("chinese"),
                    Expression::constant("english"),
                ])),
                Column::new("grade", DataType::Integer).not_null(),
            ],
        )
    }

    #[test]
    fn test_validate() -> Result<()> {
        grades().validate()?;

        let no_pk = Table::new("t", vec![Column::new("a", DataType::Integer)]);
        assert!(matches!(no_pk.validate(), Err(Error::Schema(_))));

        let two_pk = Table::new(
            "t",
            vec![
                Column::new("a", DataType::Integer).primary_key(),
                Column::new("b", DataType::Integer).primary_key(),
            ],
        );
        assert!(matches!(two_pk.validate(), Err(Error::Schema(_))));

        let duplicate = Table::new(
            "t",
            vec![Column::new("a", DataType::Integer).primary_key(), Column::new("a", DataType::Text)],
        );
        assert!(matches!(duplicate.validate(), Err(Error::Schema(_))));

        let text_autoincrement =
            Table::new("t", vec![Column::new("a", DataType::Text).primary_key().autoincrement()]);
        assert!(matches!(text_autoincrement.validate(), Err(Error::Schema(_))));

        let bad_fk = Table::new("t", vec![Column::new("a", DataType::Integer).primary_key()])
            .foreign_key("missing", "p", "id");
        assert!(matches!(bad_fk.validate(), Err(Error::Schema(_))));

        let bad_check = Table::new(
            "t",
            vec![
                Column::new("a", DataType::Integer)
                    .primary_key()
                    .check(Expression::field("b").gt(Expression::constant(0i64))),
            ],
        );
        assert!(matches!(bad_check.validate(), Err(Error::Schema(_))));
        Ok(())
    }

    #[test]
    fn test_coerce() -> Result<()> {
        let int = Column::new("a", DataType::Integer);
        assert_eq!(int.coerce(Value::Real(3.0))?, Value::Integer(3));
        assert_eq!(int.coerce(Value::from(" 42 "))?, Value::Integer(42));
        assert_eq!(int.coerce(Value::Boolean(true))?, Value::Integer(1));
        assert!(matches!(int.coerce(Value::Real(3.5)), Err(Error::Constraint(_))));
        assert!(matches!(int.coerce(Value::from("abc")), Err(Error::Constraint(_))));

        let real = Column::new("b", DataType::Real);
        assert_eq!(real.coerce(Value::Integer(2))?, Value::Real(2.0));
        assert_eq!(real.coerce(Value::from("1.5"))?, Value::Real(1.5));

        let text = Column::new("c", DataType::Text);
        assert_eq!(text.coerce(Value::Integer(7))?, Value::from("7"));
        assert_eq!(text.coerce(Value::Null)?, Value::Null);
        assert!(matches!(text.coerce(Value::Boolean(false)), Err(Error::Constraint(_))));
        Ok(())
    }

    #[test]
    fn test_check_row() -> Result<()> {
        let table = grades();
        table.check_row(&vec![1i64.into(), "Alice".into(), "math".into(), 100i64.into()])?;
        table.check_row(&vec![2i64.into(), "Alice".into(), Value::Null, 100i64.into()])?;

        assert!(matches!(
            table.check_row(&vec![3i64.into(), "Alice".into(), "art".into(), 90i64.into()]),
            Err(Error::Constraint(_))
        ));
        assert!(matches!(
            table.check_row(&vec![4i64.into(), Value::Null, "math".into(), 90i64.into()]),
            Err(Error::Constraint(_))
        ));
        Ok(())
    }
}

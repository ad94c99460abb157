use std::{cmp::Ordering, fmt::Display};

use serde::{Deserialize, Serialize};

/// Declared column types
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Real,
    Text,
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DataType::Integer => "INTEGER",
            DataType::Real => "REAL",
            DataType::Text => "TEXT",
        })
    }
}

/// Runtime value of a cell or an expression
///
/// Booleans only come out of predicates; stored cells are integer, real,
/// text or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Returns the data type of the value, or None if it's Null or Boolean
    pub fn datatype(&self) -> Option<DataType> {
        match self {
            Self::Null | Self::Boolean(_) => None,
            Self::Integer(_) => Some(DataType::Integer),
            Self::Real(_) => Some(DataType::Real),
            Self::Text(_) => Some(DataType::Text),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// SQL comparison: None if either side is NULL or the types can't be
    /// compared. Integers and reals compare numerically.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Real(b)) => (*a as f64).partial_cmp(b),
            (Value::Real(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (_, _) => None,
        }
    }

    /// Total order used by ORDER BY: NULL, booleans, numbers, then text.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Boolean(_) => 1,
                Value::Integer(_) | Value::Real(_) => 2,
                Value::Text(_) => 3,
            }
        }
        match rank(self).cmp(&rank(other)) {
            Ordering::Equal => self.compare(other).unwrap_or(Ordering::Equal),
            o => o,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(true) => write!(f, "TRUE"),
            Value::Boolean(false) => write!(f, "FALSE"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A row is a vector of values
pub type Row = Vec<Value>;

/// Stable row identifier within a table
pub type RowId = i64;

/// Column label of a result set, qualified by table name or alias when it
/// comes straight from a table.
#[derive(Clone, Debug, PartialEq)]
pub struct Label {
    pub table: Option<String>,
    pub name: String,
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self { table: None, name: name.into() }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self { table: Some(table.into()), name: name.into() }
    }

    pub fn matches(&self, table: Option<&str>, name: &str) -> bool {
        self.name == name
            && match table {
                Some(t) => self.table.as_deref() == Some(t),
                None => true,
            }
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

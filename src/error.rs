use std::{fmt::Display, num::TryFromIntError, sync::PoisonError};

use bincode::ErrorKind;
use serde::ser;

/// Custom Result type for tabledb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tabledb
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid or duplicate table/column definition
    Schema(String),
    /// NOT NULL, CHECK, FOREIGN KEY, UNIQUE or datatype violation
    Constraint(String),
    /// Nested begin, or use of a transaction that is no longer active
    Transaction(String),
    /// Malformed plan or invalid expression evaluation
    Query(String),
    /// Internal error (storage, serialization, etc.)
    Internal(String),
}

impl Error {
    pub fn is_constraint(&self) -> bool {
        matches!(self, Error::Constraint(_))
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(value: PoisonError<T>) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<Box<ErrorKind>> for Error {
    fn from(value: Box<ErrorKind>) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<TryFromIntError> for Error {
    fn from(value: TryFromIntError) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(value: regex::Error) -> Self {
        Error::Query(value.to_string())
    }
}

impl std::error::Error for Error {}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Internal(msg.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Schema(err) => write!(f, "schema error: {}", err),
            Error::Constraint(err) => write!(f, "{}", err),
            Error::Transaction(err) => write!(f, "transaction error: {}", err),
            Error::Query(err) => write!(f, "query error: {}", err),
            Error::Internal(err) => write!(f, "internal error: {}", err),
        }
    }
}

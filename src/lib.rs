//! tabledb - an embedded, in-memory relational storage engine
//!
//! This crate provides:
//! - A transactional row store with typed columns, defaults, NOT NULL,
//!   CHECK, primary key and foreign key constraints
//! - Execution of logical plans: scans, filters, joins, aggregation,
//!   ordering, limits, distinct and subqueries
//! - Single-writer transactions with atomic commit and rollback
//!
//! Plans are built programmatically, there is no SQL text parser:
//!
//! ```
//! use tabledb::sql::engine::{Engine, KVEngine};
//! use tabledb::sql::plan::{Expression, Node};
//! use tabledb::sql::schema::{Column, Table};
//! use tabledb::sql::types::{DataType, Value};
//! use tabledb::storage::memory::MemoryEngine;
//!
//! # fn main() -> tabledb::error::Result<()> {
//! let session = KVEngine::new(MemoryEngine::new()).session();
//! session.create_table(
//!     Table::new(
//!         "user",
//!         vec![
//!             Column::new("id", DataType::Integer).primary_key().autoincrement(),
//!             Column::new("name", DataType::Text),
//!         ],
//!     ),
//!     true,
//! )?;
//! session.insert("user", &["name"], vec![vec!["Alice".into()]])?;
//!
//! let result = session.execute(
//!     Node::scan("user")
//!         .filter(Expression::field("name").like(Expression::constant("a%")))
//!         .select(&["id"]),
//! )?;
//! assert_eq!(result.rows(), &[vec![Value::Integer(1)]]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod sql;
pub mod storage;

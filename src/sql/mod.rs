//! SQL processing module
//!
//! This module provides:
//! - `types`: values, rows and column labels
//! - `schema`: Table and column schema definitions
//! - `plan`: logical plan nodes and expressions
//! - `executor`: Query and mutation execution
//! - `engine`: Row store, index layer and sessions

pub mod engine;
pub mod executor;
pub mod plan;
pub mod schema;
pub mod types;

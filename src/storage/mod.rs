//! Byte-level storage
//!
//! - `engine`: ordered key/value engine trait
//! - `memory`: in-memory B-tree engine
//! - `keycode`: order-preserving key encoding
//! - `txn`: single-writer transactions with a buffered write set

pub mod engine;
pub mod keycode;
pub mod memory;
pub mod txn;

//! Core types and error handling shared across the PPDB storage engine.
//!
//! This crate has no I/O and no concurrency of its own — it just defines the
//! vocabulary (`Key`, `Value`, `TxnId`, `IsolationLevel`, ...) and the
//! `Error`/`Result` types that every other crate in the workspace returns.
//!
//! # Example
//!
//! ```
//! use ppdb_core::{Key, Value, Operation};
//!
//! let key: Key = b"user:123".to_vec();
//! let value: Value = b"John Doe".to_vec();
//! let op = Operation::Put;
//! ```

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

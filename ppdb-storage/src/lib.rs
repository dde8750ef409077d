//! Storage core for PPDB.
//!
//! This crate implements the four layers described in the top-level design:
//!
//! - **Write-Ahead Log (WAL)**: durably orders every mutation before commit.
//! - **MVCC versioning**: per-key version chains and visibility resolution.
//! - **Lock-free ordered index (skiplist)**: the concurrent structure every
//!   table's version chains live in.
//! - **Transaction manager**: txn-ids, snapshots, isolation, commit/abort.
//!
//! A `Database` binds named `Table`s (one skiplist + MVCC state each) to
//! transactions and exposes `put`/`get`/`delete`/cursors on top.
//!
//! # Architecture
//!
//! ```text
//! Write path:
//! txn_begin → put → WAL append (if enable_logging) → MVCC version install →
//!   skiplist CAS → on commit: WAL commit marker (+ sync if requested) → publish
//!
//! Read path:
//! get → MVCC resolve visible version for the txn's snapshot →
//!   skiplist lookup for the chain head → return value bytes
//! ```
//!
//! # Example
//!
//! ```no_run
//! use ppdb_storage::{Database, DatabaseConfig};
//! use ppdb_core::TxnFlags;
//!
//! let db = Database::open(DatabaseConfig::default())?;
//! let txn = db.txn_begin(TxnFlags::default());
//! db.table_create(&txn, "users")?;
//! db.put(&txn, "users", b"alice".to_vec(), b"engineer".to_vec())?;
//! db.txn_commit(txn)?;
//! # Ok::<(), ppdb_core::Error>(())
//! ```

pub mod config;
pub mod cursor;
pub mod database;
pub mod mvcc;
pub mod skiplist;
pub mod stats;
pub mod table;
pub mod txn;
pub mod wal;

pub use config::{DatabaseConfig, WalConfig};
pub use cursor::Cursor;
pub use database::Database;
pub use stats::DatabaseStats;
pub use table::Table;
pub use txn::Transaction;

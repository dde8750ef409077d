//! PPDB: an embedded key-value storage engine with MVCC, a lock-free
//! ordered index, and a write-ahead log (§1, §6).
//!
//! This crate is a thin façade over [`ppdb_storage`]: it re-exports the
//! handles the external interface names (`database_open`, `txn_begin`,
//! `table_create`, `put`/`get`/`delete`, `cursor_open`, ...) map onto as
//! idiomatic Rust methods.
//!
//! | §6 operation | Rust surface |
//! |---|---|
//! | `database_open(config)` | [`Database::open`] |
//! | `database_close(db)` | [`Database::close`] |
//! | `database_stats(db)` | [`Database::stats`] |
//! | `txn_begin(db, flags)` | [`Database::txn_begin`] |
//! | `txn_commit`/`txn_abort`/`txn_set_isolation` | [`Database::txn_commit`], [`Database::txn_abort`], [`Database::txn_set_isolation`] |
//! | `table_create`/`table_drop`/`table_open` | [`Database::table_create`], [`Database::table_drop`], [`Database::table_open`] |
//! | `put`/`get`/`delete` | [`Database::put`], [`Database::get`], [`Database::delete`] |
//! | `cursor_open`/`seek`/`next`/`prev`/`valid`/`key`/`value`/`close` | [`Database::cursor_open`], [`Cursor::seek`], [`Cursor::next`], [`Cursor::prev`], [`Cursor::valid`], [`Cursor::key`], [`Cursor::value`], [`Cursor::close`] |
//!
//! # Example
//!
//! ```no_run
//! use ppdb::{Database, DatabaseConfig};
//! use ppdb::ppdb_core::{IsolationLevel, TxnFlags};
//!
//! let db = Database::open(DatabaseConfig::default())?;
//! let txn = db.txn_begin(TxnFlags::default());
//! db.table_create(&txn, "users")?;
//! db.put(&txn, "users", b"alice".to_vec(), b"engineer".to_vec())?;
//! db.txn_commit(txn)?;
//!
//! let reader = db.txn_begin(TxnFlags::default());
//! db.txn_set_isolation(&reader, IsolationLevel::RepeatableRead)?;
//! assert_eq!(db.get(&reader, "users", b"alice")?, b"engineer");
//! # Ok::<(), ppdb::Error>(())
//! ```

pub use ppdb_core;
pub use ppdb_core::{Error, Result};
pub use ppdb_storage::{
    config, cursor, database, mvcc, skiplist, stats, table, txn, wal, Cursor, Database,
    DatabaseConfig, DatabaseStats, Table, Transaction, WalConfig,
};
pub use ppdb_storage::stats::DatabaseStatsSnapshot;

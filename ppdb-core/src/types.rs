//! Core types used throughout PPDB
//!
//! These are the fundamental data types shared by the skiplist, MVCC,
//! transaction manager, and WAL layers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A key in the database, represented as a byte vector.
pub type Key = Vec<u8>;

/// A value in the database, represented as a byte vector.
pub type Value = Vec<u8>;

/// A monotonically increasing, process-local transaction identifier.
pub type TxnId = u64;

/// A monotonically comparable commit timestamp, assigned at commit time.
pub type CommitTimestamp = u64;

/// Sentinel commit timestamp carried by a version that has not yet
/// committed. Only its own writer may observe a version at this timestamp.
pub const IN_PROGRESS: CommitTimestamp = u64::MAX;

/// Sentinel commit timestamp carried by a version whose writer aborted.
/// No snapshot may ever consider it visible.
pub const ABORTED: CommitTimestamp = u64::MAX - 1;

/// Default maximum key length in bytes (§3).
pub const DEFAULT_MAX_KEY_LEN: usize = 1024;

/// Default maximum value length in bytes (§3).
pub const DEFAULT_MAX_VALUE_LEN: usize = 1024 * 1024;

/// The type of mutation carried by a WAL record or version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Insert or update a key-value pair.
    Put,
    /// Delete a key (installs a tombstone).
    Delete,
}

/// Isolation level a transaction is declared under (§3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        IsolationLevel::Serializable
    }
}

/// The lifecycle state of a transaction (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committing,
    Committed,
    Aborted,
}

/// Per-transaction behavioral flags, set at `begin` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxnFlags {
    pub read_only: bool,
    pub sync_on_commit: bool,
    pub no_wait: bool,
}

/// Compares two byte keys the way the skiplist and WAL agree on:
/// lexicographic, with a shorter common prefix ranking as lesser (§4.1).
pub fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
    match a.cmp(b) {
        Ordering::Equal => Ordering::Equal,
        other => other,
    }
}

/// Compression algorithms reserved for the (stubbed) SSTable flush path.
/// Informational only: the WAL codec never compresses, to keep its on-disk
/// layout bit-exact (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Lz4,
    Snappy,
}

impl Default for CompressionType {
    fn default() -> Self {
        CompressionType::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ordering_tie_break_is_length() {
        assert_eq!(compare_keys(b"ab", b"abc"), Ordering::Less);
        assert_eq!(compare_keys(b"abc", b"ab"), Ordering::Greater);
        assert_eq!(compare_keys(b"abc", b"abd"), Ordering::Less);
        assert_eq!(compare_keys(b"abc", b"abc"), Ordering::Equal);
    }

    #[test]
    fn isolation_levels_order_by_strength() {
        assert!(IsolationLevel::ReadUncommitted < IsolationLevel::ReadCommitted);
        assert!(IsolationLevel::RepeatableRead < IsolationLevel::Serializable);
    }
}

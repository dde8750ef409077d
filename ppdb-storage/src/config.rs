//! Configuration for the storage core (§6).

use ppdb_core::{CompressionType, IsolationLevel};
use std::path::PathBuf;

/// WAL-specific tunables, nested under `DatabaseConfig::wal`.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Directory holding segment files (and its `archive/` subdirectory).
    pub dir_path: PathBuf,

    /// Maximum size of a single segment before rotation. The spec's default
    /// is intentionally tiny (4 KiB) so tests exercise rotation; production
    /// deployments should set this much higher (e.g. 64 MiB).
    pub segment_size: u32,

    /// If true, every `append` is followed by an fsync before returning.
    pub sync_write: bool,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            dir_path: PathBuf::from("./data/wal"),
            segment_size: 4 * 1024,
            sync_write: true,
        }
    }
}

/// Configuration options for the storage core.
///
/// This struct collects every tunable named in §6; it is a plain struct
/// with a `Default` impl (not a builder), matching the shape of the
/// storage-engine config this crate is grounded on.
///
/// # Example
///
/// ```
/// use ppdb_storage::DatabaseConfig;
/// use ppdb_core::IsolationLevel;
///
/// let config = DatabaseConfig {
///     memory_limit: 64 * 1024 * 1024,
///     default_isolation: IsolationLevel::RepeatableRead,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Hard cap on in-memory footprint, in bytes.
    pub memory_limit: usize,

    /// Reserved for a future block cache; currently informational only.
    pub cache_size: usize,

    /// When false, selects a single-version fast path: reads never block,
    /// writes are last-writer-wins.
    pub enable_mvcc: bool,

    /// When false, writes bypass the WAL entirely (no durability).
    pub enable_logging: bool,

    /// When true, `commit` flushes the WAL to disk before returning.
    pub sync_on_commit: bool,

    /// Isolation level assigned to a transaction that doesn't override it.
    pub default_isolation: IsolationLevel,

    /// Bounds per-operation contention back-off on a write-write conflict.
    pub lock_timeout_ms: u64,

    /// A transaction older than this is aborted by the reaper.
    pub txn_timeout_ms: u64,

    pub wal: WalConfig,

    /// Reserved for the (stubbed) SSTable flush path; never applied to the
    /// WAL codec, which must stay bit-exact (§6).
    pub compression: CompressionType,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            memory_limit: 10 * 1024 * 1024,
            cache_size: 64 * 1024 * 1024,
            enable_mvcc: true,
            enable_logging: true,
            sync_on_commit: true,
            default_isolation: IsolationLevel::Serializable,
            lock_timeout_ms: 1000,
            txn_timeout_ms: 5000,
            wal: WalConfig::default(),
            compression: CompressionType::default(),
        }
    }
}

//! Per-database operation counters (§4.5 Statistics).

use std::sync::atomic::{AtomicU64, Ordering};

/// Live, atomically-updated counters owned by a `Database`. Every operation
/// increments the relevant counter directly; no per-database mutex is taken
/// (§4.5 allows either "a per-database mutex or atomic counters").
#[derive(Debug, Default)]
pub struct DatabaseStats {
    reads: AtomicU64,
    writes: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    conflicts: AtomicU64,
    deadlocks: AtomicU64,

    // Supplemented from original_source/ppdb's engine/database txn counters.
    total_txns: AtomicU64,
    active_txns: AtomicU64,
    committed_txns: AtomicU64,
    aborted_txns: AtomicU64,
}

impl DatabaseStats {
    pub fn record_read(&self, bytes: usize) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_write(&self, bytes: usize) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deadlock(&self) {
        self.deadlocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_txn_begin(&self) {
        self.total_txns.fetch_add(1, Ordering::Relaxed);
        self.active_txns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_txn_committed(&self) {
        self.active_txns.fetch_sub(1, Ordering::Relaxed);
        self.committed_txns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_txn_aborted(&self) {
        self.active_txns.fetch_sub(1, Ordering::Relaxed);
        self.aborted_txns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DatabaseStatsSnapshot {
        DatabaseStatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            deadlocks: self.deadlocks.load(Ordering::Relaxed),
            total_txns: self.total_txns.load(Ordering::Relaxed),
            active_txns: self.active_txns.load(Ordering::Relaxed),
            committed_txns: self.committed_txns.load(Ordering::Relaxed),
            aborted_txns: self.aborted_txns.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of `DatabaseStats`, returned by `database_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatabaseStatsSnapshot {
    pub reads: u64,
    pub writes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub conflicts: u64,
    pub deadlocks: u64,
    pub total_txns: u64,
    pub active_txns: u64,
    pub committed_txns: u64,
    pub aborted_txns: u64,
}

//! Transaction manager: txn-id/snapshot issuance, timeouts, and the
//! commit/abort state machine (§4.3).

use crate::mvcc::{Snapshot, Version};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use ppdb_core::{
    CommitTimestamp, Error, IsolationLevel, Result, TxnFlags, TxnId, TxnState,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn state_to_u8(state: TxnState) -> u8 {
    match state {
        TxnState::Active => 0,
        TxnState::Committing => 1,
        TxnState::Committed => 2,
        TxnState::Aborted => 3,
    }
}

fn state_from_u8(v: u8) -> TxnState {
    match v {
        0 => TxnState::Active,
        1 => TxnState::Committing,
        2 => TxnState::Committed,
        _ => TxnState::Aborted,
    }
}

fn isolation_to_u8(level: IsolationLevel) -> u8 {
    match level {
        IsolationLevel::ReadUncommitted => 0,
        IsolationLevel::ReadCommitted => 1,
        IsolationLevel::RepeatableRead => 2,
        IsolationLevel::Serializable => 3,
    }
}

fn isolation_from_u8(v: u8) -> IsolationLevel {
    match v {
        0 => IsolationLevel::ReadUncommitted,
        1 => IsolationLevel::ReadCommitted,
        2 => IsolationLevel::RepeatableRead,
        _ => IsolationLevel::Serializable,
    }
}

/// A single key read while resolving a version, recorded so `Serializable`
/// commit validation can detect that the visible answer changed underneath
/// the transaction (§4.2 Write-write conflict / §4.3 commit protocol).
#[derive(Clone)]
pub struct ReadSetEntry {
    pub table: String,
    pub key: Vec<u8>,
    pub observed: Option<Arc<Version>>,
}

/// A pending mutation, recorded for WAL emission and commit/abort (§3).
#[derive(Clone)]
pub struct WriteSetEntry {
    pub table: String,
    pub key: Vec<u8>,
    pub version: Arc<Version>,
}

/// A single transaction handle (§3 Transaction).
pub struct Transaction {
    pub txn_id: TxnId,
    pub flags: TxnFlags,
    isolation: AtomicU8,
    /// Commit timestamp and active-txn set captured once at `begin`; these
    /// never change even if `txn_set_isolation` later changes how they're
    /// interpreted.
    snapshot_commit_ts: CommitTimestamp,
    snapshot_active_at_start: HashSet<TxnId>,
    state: AtomicU8,
    started_at: Instant,
    timeout: Option<Duration>,

    read_set: Mutex<Vec<ReadSetEntry>>,
    write_set: Mutex<Vec<WriteSetEntry>>,

    reads: AtomicU64,
    writes: AtomicU64,
}

impl Transaction {
    pub fn state(&self) -> TxnState {
        state_from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TxnState) {
        self.state.store(state_to_u8(state), Ordering::Release);
    }

    pub fn isolation(&self) -> IsolationLevel {
        isolation_from_u8(self.isolation.load(Ordering::Acquire))
    }

    /// Changes the isolation level this transaction reads under (§6
    /// `txn_set_isolation`). Only valid while `Active`.
    pub fn set_isolation(&self, level: IsolationLevel) -> Result<()> {
        self.check_active()?;
        self.isolation.store(isolation_to_u8(level), Ordering::Release);
        Ok(())
    }

    /// A fresh view combining the fixed snapshot captured at `begin` with
    /// the current isolation level, used to resolve every read/write.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.txn_id,
            self.isolation(),
            self.snapshot_commit_ts,
            self.snapshot_active_at_start.clone(),
        )
    }

    /// Fails with `InvalidState` unless the transaction is `Active`, and
    /// cooperatively aborts it if its timeout has already elapsed (§5
    /// Suspension points: "cancellation on timeout is cooperative").
    pub fn check_active(&self) -> Result<()> {
        if let Some(timeout) = self.timeout {
            if self.state() == TxnState::Active && self.started_at.elapsed() > timeout {
                self.set_state(TxnState::Aborted);
            }
        }
        if self.state() != TxnState::Active {
            return Err(Error::InvalidState(format!(
                "transaction {} is not active",
                self.txn_id
            )));
        }
        Ok(())
    }

    pub fn record_read(&self, table: &str, key: &[u8], observed: Option<Arc<Version>>) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.read_set.lock().push(ReadSetEntry {
            table: table.to_string(),
            key: key.to_vec(),
            observed,
        });
    }

    pub fn record_write(&self, table: &str, key: &[u8], version: Arc<Version>) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.write_set.lock().push(WriteSetEntry {
            table: table.to_string(),
            key: key.to_vec(),
            version,
        });
    }

    pub fn read_set(&self) -> Vec<ReadSetEntry> {
        self.read_set.lock().clone()
    }

    pub fn write_set(&self) -> Vec<WriteSetEntry> {
        self.write_set.lock().clone()
    }

    /// Per-transaction read/write counters (supplemented from
    /// `original_source/ppdb`'s `ppdb_engine_txn_stats_t`).
    pub fn stats(&self) -> (u64, u64) {
        (
            self.reads.load(Ordering::Relaxed),
            self.writes.load(Ordering::Relaxed),
        )
    }
}

impl Clone for ReadSetEntry {
    fn clone(&self) -> Self {
        ReadSetEntry {
            table: self.table.clone(),
            key: self.key.clone(),
            observed: self.observed.clone(),
        }
    }
}

impl Clone for WriteSetEntry {
    fn clone(&self) -> Self {
        WriteSetEntry {
            table: self.table.clone(),
            key: self.key.clone(),
            version: self.version.clone(),
        }
    }
}

/// Issues txn-ids and snapshots, tracks the active set, and owns the
/// monotonic commit-timestamp counter (§4.3, §9 "Global state": both
/// counters live on the database handle to permit multiple in-process
/// databases).
pub struct TransactionManager {
    next_txn_id: AtomicU64,
    next_commit_ts: AtomicU64,
    /// Maps each active txn-id to the commit timestamp it captured at
    /// `begin` — this doubles as the input to `oldest_active_snapshot_ts`,
    /// which GC uses to decide what's safe to reclaim (§4.2).
    active: RwLock<std::collections::HashMap<TxnId, CommitTimestamp>>,
    default_lock_timeout_ms: u64,
    default_txn_timeout_ms: u64,
}

impl TransactionManager {
    pub fn new(default_lock_timeout_ms: u64, default_txn_timeout_ms: u64) -> Self {
        Self {
            next_txn_id: AtomicU64::new(1),
            next_commit_ts: AtomicU64::new(1),
            active: RwLock::new(std::collections::HashMap::new()),
            default_lock_timeout_ms,
            default_txn_timeout_ms,
        }
    }

    /// The lowest snapshot timestamp among currently active transactions, or
    /// `None` if there are none. A version committed before this timestamp
    /// cannot be the visible version for any active reader (§4.2 GC).
    pub fn oldest_active_snapshot_ts(&self) -> Option<CommitTimestamp> {
        self.active.read().values().copied().min()
    }

    /// Reseeds the txn-id counter above the highest id recovered from the
    /// WAL (§4.3 "On crash recovery, the recovered maximum is reloaded").
    pub fn reseed_txn_id(&self, recovered_max: TxnId) {
        let mut current = self.next_txn_id.load(Ordering::Acquire);
        while recovered_max + 1 > current {
            match self.next_txn_id.compare_exchange(
                current,
                recovered_max + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// Reseeds the commit-timestamp counter above the highest commit
    /// timestamp recovered from the WAL, so a freshly begun
    /// RepeatableRead/Serializable snapshot already covers every recovered
    /// version instead of starting back at 1 (§4.3 recovery).
    pub fn reseed_commit_ts(&self, recovered_max: CommitTimestamp) {
        let mut current = self.next_commit_ts.load(Ordering::Acquire);
        while recovered_max + 1 > current {
            match self.next_commit_ts.compare_exchange(
                current,
                recovered_max + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.default_lock_timeout_ms)
    }

    pub fn begin(&self, isolation: IsolationLevel, flags: TxnFlags, timeout_ms: Option<u64>) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::AcqRel);
        let commit_ts = self.next_commit_ts.load(Ordering::Acquire);

        let mut active = self.active.write();
        let active_at_start: HashSet<TxnId> = active.keys().copied().collect();
        active.insert(txn_id, commit_ts);
        drop(active);

        debug!("txn {txn_id} begin at snapshot ts={commit_ts}, isolation={isolation:?}");

        let timeout_ms = timeout_ms.unwrap_or(self.default_txn_timeout_ms);
        let timeout = if timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(timeout_ms))
        };

        Arc::new(Transaction {
            txn_id,
            flags,
            isolation: AtomicU8::new(isolation_to_u8(isolation)),
            snapshot_commit_ts: commit_ts,
            snapshot_active_at_start: active_at_start,
            state: AtomicU8::new(state_to_u8(TxnState::Active)),
            started_at: Instant::now(),
            timeout,
            read_set: Mutex::new(Vec::new()),
            write_set: Mutex::new(Vec::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        })
    }

    /// Assigns the next commit timestamp (§4.3 Commit protocol step 1).
    pub fn assign_commit_timestamp(&self) -> CommitTimestamp {
        self.next_commit_ts.fetch_add(1, Ordering::AcqRel)
    }

    pub fn finish(&self, txn: &Transaction, state: TxnState) {
        debug_assert!(matches!(state, TxnState::Committed | TxnState::Aborted));
        txn.set_state(state);
        self.active.write().remove(&txn.txn_id);
    }

    pub fn mark_committing(&self, txn: &Transaction) -> Result<()> {
        txn.check_active()?;
        txn.set_state(TxnState::Committing);
        Ok(())
    }

    pub fn active_txn_count(&self) -> usize {
        self.active.read().len()
    }

    /// Aborts every transaction whose age exceeds its timeout (§4.3 reaper).
    /// Intended to be called periodically by a caller-owned background loop;
    /// this crate does not spawn threads of its own.
    pub fn reap_expired<'a>(&self, txns: impl Iterator<Item = &'a Arc<Transaction>>) {
        for txn in txns {
            if txn.check_active().is_err() && txn.state() == TxnState::Aborted {
                warn!("txn {} reaped after exceeding its timeout", txn.txn_id);
                self.active.write().remove(&txn.txn_id);
            }
        }
    }
}

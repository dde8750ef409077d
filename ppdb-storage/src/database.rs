//! The storage facade: tables bound to transactions, cursors, and
//! recovery/close lifecycle (§4.5).

use crate::config::DatabaseConfig;
use crate::cursor::Cursor;
use crate::mvcc::{check_write_conflict, Version};
use crate::stats::{DatabaseStats, DatabaseStatsSnapshot};
use crate::table::Table;
use crate::txn::{Transaction, TransactionManager};
use crate::wal::{self, Record, Wal};
use log::info;
use parking_lot::RwLock;
use ppdb_core::{
    CommitTimestamp, Error, IsolationLevel, Key, Result, TxnFlags, TxnId, TxnState, Value,
    DEFAULT_MAX_KEY_LEN, DEFAULT_MAX_VALUE_LEN,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("key must not be empty".into()));
    }
    if key.len() > DEFAULT_MAX_KEY_LEN {
        return Err(Error::InvalidArgument(format!(
            "key length {} exceeds maximum {DEFAULT_MAX_KEY_LEN}",
            key.len()
        )));
    }
    Ok(())
}

fn validate_value(value: &[u8]) -> Result<()> {
    if value.len() > DEFAULT_MAX_VALUE_LEN {
        return Err(Error::InvalidArgument(format!(
            "value length {} exceeds maximum {DEFAULT_MAX_VALUE_LEN}",
            value.len()
        )));
    }
    Ok(())
}

fn require_writable(txn: &Transaction) -> Result<()> {
    if txn.flags.read_only {
        return Err(Error::InvalidState(
            "read-only transaction cannot write".into(),
        ));
    }
    Ok(())
}

/// Scans a single segment file and reports `(highest commit timestamp seen,
/// whether every txn-id referenced by a Put/Delete in it also has a matching
/// CommitMarker in it)`. Used by `Database::archive_safe_segments` to decide
/// whether a segment is safe to move under `archive/` (§4.4 Truncation
/// rules). Deliberately segment-local: a transaction whose CommitMarker
/// landed in a later segment (because it straddled a rotation) keeps this
/// segment un-archivable until that later segment is scanned too, since the
/// txn-id will show up unresolved here every time.
fn segment_archive_summary(path: &Path) -> Result<(CommitTimestamp, bool)> {
    let records = wal::read_segment(path)?;
    let mut pending: HashSet<TxnId> = HashSet::new();
    let mut max_commit_ts: CommitTimestamp = 0;
    for record in &records {
        match record {
            Record::Put { txn_id, .. } | Record::Delete { txn_id, .. } => {
                pending.insert(*txn_id);
            }
            Record::CommitMarker { txn_id, commit_ts } => {
                pending.remove(txn_id);
                max_commit_ts = max_commit_ts.max(*commit_ts);
            }
        }
    }
    Ok((max_commit_ts, pending.is_empty()))
}

/// The top-level handle returned by `database_open` (§6).
pub struct Database {
    config: DatabaseConfig,
    wal: Option<Wal>,
    txn_manager: TransactionManager,
    tables: RwLock<HashMap<String, Arc<Table>>>,
    stats: DatabaseStats,
    /// Approximate live value-byte footprint, checked against
    /// `config.memory_limit` on every `put` (§6, §7).
    memory_used: AtomicUsize,
}

impl Database {
    /// Opens (or creates) the database, replaying its WAL if logging is
    /// enabled (§4.4 Recovery).
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        let wal = if config.enable_logging {
            Some(Wal::open(
                &config.wal.dir_path,
                config.wal.segment_size,
                config.wal.sync_write,
            )?)
        } else {
            None
        };

        let txn_manager = TransactionManager::new(config.lock_timeout_ms, config.txn_timeout_ms);
        let tables: RwLock<HashMap<String, Arc<Table>>> = RwLock::new(HashMap::new());
        let mut memory_used = 0usize;

        if let Some(wal) = &wal {
            let recovered = wal::replay(wal.dir_path())?;
            txn_manager.reseed_txn_id(recovered.max_txn_id);
            txn_manager.reseed_commit_ts(recovered.max_commit_ts);
            info!(
                "WAL recovery at {:?} materialized {} writes",
                wal.dir_path(),
                recovered.writes.len()
            );
            let mut guard = tables.write();
            for write in recovered.writes {
                let table = guard
                    .entry(write.table.clone())
                    .or_insert_with(|| Arc::new(Table::new(write.table.clone())))
                    .clone();
                let payload = write.value;
                let commit_ts = write.commit_ts;
                table.index.install(&write.key, move |observed| {
                    let version = Arc::new(Version::new(0, payload.clone(), observed.cloned()));
                    version.mark_committed(commit_ts);
                    Ok(version)
                })?;
            }
            for table in guard.values() {
                table.index.range_scan(&[], None, |_key, head| {
                    if let Some(payload) = &head.payload {
                        memory_used += payload.len();
                    }
                    true
                });
            }
        }

        Ok(Self {
            config,
            wal,
            txn_manager,
            tables,
            stats: DatabaseStats::default(),
            memory_used: AtomicUsize::new(memory_used),
        })
    }

    /// Flushes the WAL, if any. All in-memory state is simply dropped;
    /// nothing else is persisted (§6 "Persisted state: only the WAL
    /// directory").
    pub fn close(self) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.sync()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> DatabaseStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn txn_begin(&self, flags: TxnFlags) -> Arc<Transaction> {
        self.stats.record_txn_begin();
        self.txn_manager.begin(
            self.config.default_isolation,
            flags,
            Some(self.config.txn_timeout_ms),
        )
    }

    pub fn txn_set_isolation(&self, txn: &Transaction, level: IsolationLevel) -> Result<()> {
        txn.set_isolation(level)
    }

    fn lookup_table(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .read()
            .get(name)
            .filter(|t| !t.is_dropped())
            .cloned()
            .ok_or(Error::NotFound)
    }

    pub fn table_create(&self, txn: &Transaction, name: &str) -> Result<()> {
        txn.check_active()?;
        require_writable(txn)?;
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(Error::Exists);
        }
        tables.insert(name.to_string(), Arc::new(Table::new(name)));
        Ok(())
    }

    pub fn table_drop(&self, txn: &Transaction, name: &str) -> Result<()> {
        txn.check_active()?;
        require_writable(txn)?;
        let table = self.lookup_table(name)?;
        table.mark_dropped();
        self.tables.write().remove(name);
        Ok(())
    }

    pub fn table_open(&self, txn: &Transaction, name: &str) -> Result<Arc<Table>> {
        txn.check_active()?;
        self.lookup_table(name)
    }

    /// Writes a WAL record for a pending mutation, unless logging is
    /// disabled (§2 Data flow for a write). Called only from the commit
    /// path: a write's record is emitted exactly once, when the
    /// transaction that made it actually commits (§4.2 "No WAL emission"
    /// on abort would otherwise be violated by logging at `put`/`delete`
    /// time and logging it again from the write set at commit).
    fn wal_append(&self, record: Record) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.append(&record)?;
        }
        Ok(())
    }

    /// Grows or shrinks the tracked value-byte footprint by `new_size -
    /// old_size`, rejecting a growth that would exceed `memory_limit`
    /// (`0` means unlimited). Shrinking never fails.
    fn reserve_memory(&self, old_size: usize, new_size: usize) -> Result<()> {
        if new_size <= old_size {
            let shrink = old_size - new_size;
            if shrink > 0 {
                self.memory_used.fetch_sub(shrink, Ordering::Relaxed);
            }
            return Ok(());
        }
        let grow = new_size - old_size;
        if self.config.memory_limit > 0 {
            let projected = self.memory_used.fetch_add(grow, Ordering::Relaxed) + grow;
            if projected > self.config.memory_limit {
                self.memory_used.fetch_sub(grow, Ordering::Relaxed);
                return Err(Error::MemoryLimit);
            }
        } else {
            self.memory_used.fetch_add(grow, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Undoes a `reserve_memory(old_size, new_size)` call whose write never
    /// actually landed (the install it guarded failed).
    fn release_memory(&self, old_size: usize, new_size: usize) {
        if new_size > old_size {
            self.memory_used.fetch_sub(new_size - old_size, Ordering::Relaxed);
        } else if old_size > new_size {
            self.memory_used.fetch_add(old_size - new_size, Ordering::Relaxed);
        }
    }

    /// Installs a new version for `key`, honoring `config.enable_mvcc` and
    /// the §4.2 no-wait/bounded-backoff conflict policy: a transient
    /// `Busy` (the current head belongs to another still-active writer) is
    /// retried with a short sleep until `lock_timeout_ms` elapses, unless
    /// the transaction set `no_wait`, in which case it surfaces
    /// immediately. A permanent `Conflict` is never retried.
    fn install_version(
        &self,
        txn: &Transaction,
        table: &Table,
        key: &[u8],
        payload: Option<Value>,
    ) -> Result<Arc<Version>> {
        let mvcc_enabled = self.config.enable_mvcc;
        let creator = txn.txn_id;
        let deadline = Instant::now() + self.txn_manager.lock_timeout();
        loop {
            let snapshot = txn.snapshot();
            let payload_for_closure = payload.clone();
            let attempt = table.index.install(key, move |observed| {
                if mvcc_enabled {
                    check_write_conflict(&snapshot, observed)?;
                }
                Ok(Arc::new(Version::new(
                    creator,
                    payload_for_closure.clone(),
                    observed.cloned(),
                )))
            });

            match attempt {
                Ok(v) => return Ok(v),
                Err(Error::Busy) => {
                    if txn.flags.no_wait || Instant::now() >= deadline {
                        self.stats.record_conflict();
                        return Err(Error::Busy);
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(Error::Conflict) => {
                    self.stats.record_conflict();
                    return Err(Error::Conflict);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn put(&self, txn: &Transaction, table: &str, key: Key, value: Value) -> Result<()> {
        txn.check_active()?;
        require_writable(txn)?;
        validate_key(&key)?;
        validate_value(&value)?;
        if value.is_empty() {
            return Err(Error::InvalidArgument(
                "value must not be empty; use delete for tombstones".into(),
            ));
        }

        let t = self.lookup_table(table)?;
        let old_size = t
            .index
            .get(&key)
            .and_then(|v| v.payload.as_ref().map(|p| p.len()))
            .unwrap_or(0);
        self.reserve_memory(old_size, value.len())?;

        let version = match self.install_version(txn, &t, &key, Some(value.clone())) {
            Ok(v) => v,
            Err(e) => {
                self.release_memory(old_size, value.len());
                return Err(e);
            }
        };

        txn.record_write(table, &key, version);
        self.stats.record_write(key.len() + value.len());
        Ok(())
    }

    pub fn get(&self, txn: &Transaction, table: &str, key: &[u8]) -> Result<Value> {
        txn.check_active()?;
        validate_key(key)?;

        let t = self.lookup_table(table)?;
        let head = t.index.get(key);
        let resolved = if self.config.enable_mvcc {
            let snapshot = txn.snapshot();
            let resolved = head.as_ref().and_then(|h| snapshot.resolve(h)).cloned();
            txn.record_read(table, key, resolved.clone());
            resolved
        } else {
            // Single-version fast path (§6 `enable_mvcc = false`): the
            // chain head is the only value that exists, visible the
            // instant it is installed, no read-set bookkeeping.
            head
        };

        match resolved {
            Some(v) if v.payload.is_some() => {
                let payload = v.payload.clone().unwrap();
                self.stats.record_read(payload.len());
                Ok(payload)
            }
            _ => {
                self.stats.record_read(0);
                Err(Error::NotFound)
            }
        }
    }

    pub fn delete(&self, txn: &Transaction, table: &str, key: &[u8]) -> Result<()> {
        txn.check_active()?;
        require_writable(txn)?;
        validate_key(key)?;

        let t = self.lookup_table(table)?;
        let old_size = t
            .index
            .get(key)
            .and_then(|v| v.payload.as_ref().map(|p| p.len()))
            .unwrap_or(0);
        self.reserve_memory(old_size, 0)?;

        let version = match self.install_version(txn, &t, key, None) {
            Ok(v) => v,
            Err(e) => {
                self.release_memory(old_size, 0);
                return Err(e);
            }
        };

        txn.record_write(table, key, version);
        self.stats.record_write(key.len());
        Ok(())
    }

    pub fn cursor_open(&self, txn: &Transaction, table: &str) -> Result<Cursor> {
        txn.check_active()?;
        let t = self.lookup_table(table)?;
        Ok(Cursor::new(t, txn.snapshot()))
    }

    /// A pure memory-table sync is a no-op; reserved for the (stubbed)
    /// SSTable integration (§4.5 `sync`).
    pub fn sync(&self, _table: &str) -> Result<()> {
        Ok(())
    }

    /// Archives every closed segment that is both fully committed (no
    /// Put/Delete left without a matching CommitMarker in the same segment)
    /// and older than every active reader's snapshot, per §4.4's truncation
    /// rule. Returns the number of segments archived. A no-op when logging
    /// is disabled.
    pub fn archive_safe_segments(&self) -> Result<usize> {
        let Some(wal) = &self.wal else {
            return Ok(0);
        };
        let current = wal.current_segment_id();
        let oldest_active = self.txn_manager.oldest_active_snapshot_ts();
        let mut archived = 0;
        for id in wal.segment_ids()? {
            if id == current {
                continue;
            }
            let path = wal.dir_path().join(wal::segment_filename(id));
            let (max_commit_ts, fully_committed) = segment_archive_summary(&path)?;
            let old_enough = match oldest_active {
                Some(ts) => max_commit_ts < ts,
                None => true,
            };
            if fully_committed && old_enough {
                wal.archive_segment(id)?;
                archived += 1;
            }
        }
        Ok(archived)
    }

    /// Validates and finalizes a transaction (§4.2 Commit protocol, §4.3
    /// state machine).
    pub fn txn_commit(&self, txn: Arc<Transaction>) -> Result<()> {
        self.txn_manager.mark_committing(&txn)?;

        if txn.isolation() == IsolationLevel::Serializable {
            if let Err(e) = self.validate_serializable(&txn) {
                self.txn_manager.finish(&txn, TxnState::Aborted);
                self.stats.record_txn_aborted();
                self.stats.record_conflict();
                self.stats.record_deadlock();
                return Err(e);
            }
        }

        let commit_ts = self.txn_manager.assign_commit_timestamp();

        if self.wal.is_some() {
            for entry in txn.write_set() {
                let record = match &entry.version.payload {
                    Some(value) => Record::Put {
                        txn_id: txn.txn_id,
                        table: entry.table.clone(),
                        key: entry.key.clone(),
                        value: value.clone(),
                    },
                    None => Record::Delete {
                        txn_id: txn.txn_id,
                        table: entry.table.clone(),
                        key: entry.key.clone(),
                    },
                };
                self.wal_append(record)?;
            }
            self.wal_append(Record::CommitMarker {
                txn_id: txn.txn_id,
                commit_ts,
            })?;
            if txn.flags.sync_on_commit || self.config.sync_on_commit {
                if let Some(wal) = &self.wal {
                    wal.sync()?;
                }
            }
        }

        for entry in txn.write_set() {
            entry.version.mark_committed(commit_ts);
        }

        self.txn_manager.finish(&txn, TxnState::Committed);
        self.stats.record_txn_committed();
        Ok(())
    }

    /// Re-resolves every key this transaction read, using its freshly
    /// assigned read-set comparison: if resolving again (still against the
    /// transaction's own snapshot, since commit_ts hasn't been assigned yet)
    /// yields a different version than what was originally observed, the
    /// value underneath this transaction changed and it must abort (§4.2
    /// step 2).
    fn validate_serializable(&self, txn: &Transaction) -> Result<()> {
        let snapshot = txn.snapshot();
        for entry in txn.read_set() {
            let table = match self.lookup_table(&entry.table) {
                Ok(t) => t,
                Err(_) => continue,
            };
            let head = table.index.get(&entry.key);
            let current = head.as_ref().and_then(|h| snapshot.resolve(h));
            let matches = match (&entry.observed, current) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            };
            if !matches {
                return Err(Error::Conflict);
            }
        }
        Ok(())
    }

    /// Marks every in-progress version this transaction wrote as aborted; no
    /// WAL emission (§4.2 Abort).
    pub fn txn_abort(&self, txn: Arc<Transaction>) -> Result<()> {
        for entry in txn.write_set() {
            entry.version.mark_aborted();
        }
        self.txn_manager.finish(&txn, TxnState::Aborted);
        self.stats.record_txn_aborted();
        Ok(())
    }

    /// Walks every table's keys and physically removes any whose newest
    /// version is a tombstone/abort older than every active transaction's
    /// snapshot (§4.2 Garbage collection). Not scheduled automatically —
    /// callers invoke this periodically from their own runtime.
    pub fn run_gc(&self) {
        let Some(oldest_active) = self.txn_manager.oldest_active_snapshot_ts() else {
            return;
        };
        let tables: Vec<Arc<Table>> = self.tables.read().values().cloned().collect();
        for table in tables {
            let mut collectable = Vec::new();
            table.index.range_scan(&[], None, |key, head| {
                let collectable_here = (head.is_tombstone() || head.is_aborted())
                    && !head.is_in_progress()
                    && head.commit_ts() < oldest_active;
                if collectable_here {
                    collectable.push(key.to_vec());
                }
                true
            });
            for key in collectable {
                let _ = table.index.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_db(dir: &TempDir) -> Database {
        let config = DatabaseConfig {
            wal: crate::config::WalConfig {
                dir_path: dir.path().join("wal"),
                segment_size: 64 * 1024,
                sync_write: false,
            },
            ..Default::default()
        };
        Database::open(config).unwrap()
    }

    #[test]
    fn basic_put_get_commit() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let txn = db.txn_begin(TxnFlags::default());
        db.table_create(&txn, "t").unwrap();
        db.put(&txn, "t", b"hello".to_vec(), b"world".to_vec()).unwrap();
        db.txn_commit(txn).unwrap();

        let reader = db.txn_begin(TxnFlags::default());
        let value = db.get(&reader, "t", b"hello").unwrap();
        assert_eq!(value, b"world");
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let txn = db.txn_begin(TxnFlags::default());
        db.table_create(&txn, "t").unwrap();
        db.put(&txn, "t", b"k".to_vec(), b"v".to_vec()).unwrap();
        db.delete(&txn, "t", b"k").unwrap();
        db.txn_commit(txn).unwrap();

        let reader = db.txn_begin(TxnFlags::default());
        assert!(matches!(db.get(&reader, "t", b"k"), Err(Error::NotFound)));
    }

    #[test]
    fn snapshot_isolation_hides_concurrent_commit() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let setup = db.txn_begin(TxnFlags::default());
        db.table_create(&setup, "t").unwrap();
        db.put(&setup, "t", b"k".to_vec(), b"v1".to_vec()).unwrap();
        db.txn_commit(setup).unwrap();

        let reader = db.txn_begin(TxnFlags::default());
        db.txn_set_isolation(&reader, IsolationLevel::RepeatableRead)
            .unwrap();
        assert_eq!(db.get(&reader, "t", b"k").unwrap(), b"v1");

        let writer = db.txn_begin(TxnFlags::default());
        db.put(&writer, "t", b"k".to_vec(), b"v2".to_vec()).unwrap();
        db.txn_commit(writer).unwrap();

        assert_eq!(db.get(&reader, "t", b"k").unwrap(), b"v1");

        let reader2 = db.txn_begin(TxnFlags::default());
        assert_eq!(db.get(&reader2, "t", b"k").unwrap(), b"v2");
    }

    #[test]
    fn write_write_conflict_under_serializable() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let setup = db.txn_begin(TxnFlags::default());
        db.table_create(&setup, "t").unwrap();
        db.txn_commit(setup).unwrap();

        let t1 = db.txn_begin(TxnFlags::default());
        let t2 = db.txn_begin(TxnFlags::default());
        db.put(&t1, "t", b"k".to_vec(), b"a".to_vec()).unwrap();
        db.txn_commit(t1).unwrap();

        // t2's snapshot predates t1's commit, so installing over the
        // already-committed head is a permanent conflict, not a transient
        // `Busy` contending with an in-progress writer.
        assert!(matches!(
            db.put(&t2, "t", b"k".to_vec(), b"b".to_vec()),
            Err(Error::Conflict)
        ));
    }

    #[test]
    fn lost_update_prevented_under_serializable() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(open_db(&dir));
        let setup = db.txn_begin(TxnFlags::default());
        db.table_create(&setup, "t").unwrap();
        db.put(&setup, "t", b"k".to_vec(), b"10".to_vec()).unwrap();
        db.txn_commit(setup).unwrap();

        let t1 = db.txn_begin(TxnFlags::default());
        let t2 = db.txn_begin(TxnFlags::default());
        assert_eq!(db.get(&t1, "t", b"k").unwrap(), b"10");
        assert_eq!(db.get(&t2, "t", b"k").unwrap(), b"10");

        db.put(&t1, "t", b"k".to_vec(), b"11".to_vec()).unwrap();

        // t2's put races t1's in-progress version: it blocks in the
        // no-wait/back-off retry loop until t1 resolves, then re-observes a
        // head committed after t2's snapshot and surfaces a permanent
        // conflict rather than silently overwriting t1's update.
        let db2 = Arc::clone(&db);
        let handle = std::thread::spawn(move || db2.put(&t2, "t", b"k".to_vec(), b"11".to_vec()));

        std::thread::sleep(Duration::from_millis(50));
        db.txn_commit(t1).unwrap();

        assert!(matches!(handle.join().unwrap(), Err(Error::Conflict)));
    }

    #[test]
    fn recovers_committed_writes_after_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let db = open_db(&dir);
            let txn = db.txn_begin(TxnFlags::default());
            db.table_create(&txn, "t").unwrap();
            db.put(&txn, "t", b"k".to_vec(), b"v".to_vec()).unwrap();
            db.txn_commit(txn).unwrap();
            db.close().unwrap();
        }

        let db = open_db(&dir);
        let reader = db.txn_begin(TxnFlags::default());
        assert_eq!(db.get(&reader, "t", b"k").unwrap(), b"v");
    }

    #[test]
    fn cursor_visits_visible_keys_in_order() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let txn = db.txn_begin(TxnFlags::default());
        db.table_create(&txn, "t").unwrap();
        for k in [b"a", b"b", b"c"] {
            db.put(&txn, "t", k.to_vec(), b"v".to_vec()).unwrap();
        }
        db.txn_commit(txn).unwrap();

        let reader = db.txn_begin(TxnFlags::default());
        let mut cursor = db.cursor_open(&reader, "t").unwrap();
        assert!(cursor.seek(b"a"));
        let mut seen = vec![cursor.key().unwrap().to_vec()];
        while cursor.next() {
            seen.push(cursor.key().unwrap().to_vec());
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn put_rejects_empty_value() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let txn = db.txn_begin(TxnFlags::default());
        db.table_create(&txn, "t").unwrap();
        assert!(matches!(
            db.put(&txn, "t", b"k".to_vec(), Vec::new()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn read_only_transaction_cannot_write() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let setup = db.txn_begin(TxnFlags::default());
        db.table_create(&setup, "t").unwrap();
        db.txn_commit(setup).unwrap();

        let mut flags = TxnFlags::default();
        flags.read_only = true;
        let txn = db.txn_begin(flags);
        assert!(matches!(
            db.put(&txn, "t", b"k".to_vec(), b"v".to_vec()),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn no_wait_surfaces_busy_immediately_on_contended_write() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(open_db(&dir));
        let setup = db.txn_begin(TxnFlags::default());
        db.table_create(&setup, "t").unwrap();
        db.txn_commit(setup).unwrap();

        let t1 = db.txn_begin(TxnFlags::default());
        db.put(&t1, "t", b"k".to_vec(), b"a".to_vec()).unwrap();

        let mut flags = TxnFlags::default();
        flags.no_wait = true;
        let t2 = db.txn_begin(flags);

        let started = Instant::now();
        assert!(matches!(
            db.put(&t2, "t", b"k".to_vec(), b"b".to_vec()),
            Err(Error::Busy)
        ));
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn single_version_fast_path_allows_last_writer_wins() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            enable_mvcc: false,
            wal: crate::config::WalConfig {
                dir_path: dir.path().join("wal"),
                segment_size: 64 * 1024,
                sync_write: false,
            },
            ..Default::default()
        };
        let db = Database::open(config).unwrap();
        let setup = db.txn_begin(TxnFlags::default());
        db.table_create(&setup, "t").unwrap();
        db.txn_commit(setup).unwrap();

        let t1 = db.txn_begin(TxnFlags::default());
        let t2 = db.txn_begin(TxnFlags::default());
        db.put(&t1, "t", b"k".to_vec(), b"a".to_vec()).unwrap();
        // With MVCC disabled, t2 installs right over t1's in-progress
        // version instead of contending with it.
        db.put(&t2, "t", b"k".to_vec(), b"b".to_vec()).unwrap();
        db.txn_commit(t1).unwrap();
        db.txn_commit(t2).unwrap();

        let reader = db.txn_begin(TxnFlags::default());
        assert_eq!(db.get(&reader, "t", b"k").unwrap(), b"b");
    }

    #[test]
    fn memory_limit_rejects_oversized_put() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            memory_limit: 4,
            wal: crate::config::WalConfig {
                dir_path: dir.path().join("wal"),
                segment_size: 64 * 1024,
                sync_write: false,
            },
            ..Default::default()
        };
        let db = Database::open(config).unwrap();
        let txn = db.txn_begin(TxnFlags::default());
        db.table_create(&txn, "t").unwrap();
        assert!(matches!(
            db.put(&txn, "t", b"k".to_vec(), b"too-big".to_vec()),
            Err(Error::MemoryLimit)
        ));
    }

    #[test]
    fn memory_limit_allows_put_within_budget_then_rejects_growth() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            memory_limit: 4,
            wal: crate::config::WalConfig {
                dir_path: dir.path().join("wal"),
                segment_size: 64 * 1024,
                sync_write: false,
            },
            ..Default::default()
        };
        let db = Database::open(config).unwrap();
        let txn = db.txn_begin(TxnFlags::default());
        db.table_create(&txn, "t").unwrap();
        db.put(&txn, "t", b"k".to_vec(), b"ab".to_vec()).unwrap();
        // Overwriting with a smaller value frees room, a bigger one doesn't fit.
        assert!(matches!(
            db.put(&txn, "t", b"k".to_vec(), b"abcde".to_vec()),
            Err(Error::MemoryLimit)
        ));
        db.put(&txn, "t", b"k".to_vec(), b"cd".to_vec()).unwrap();
    }

    #[test]
    fn serializable_validation_failure_records_a_deadlock() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let setup = db.txn_begin(TxnFlags::default());
        db.table_create(&setup, "t").unwrap();
        db.put(&setup, "t", b"k".to_vec(), b"1".to_vec()).unwrap();
        db.txn_commit(setup).unwrap();

        let reader = db.txn_begin(TxnFlags::default());
        assert_eq!(db.get(&reader, "t", b"k").unwrap(), b"1");

        let writer = db.txn_begin(TxnFlags::default());
        db.put(&writer, "t", b"k".to_vec(), b"2".to_vec()).unwrap();
        db.txn_commit(writer).unwrap();

        assert!(matches!(db.txn_commit(reader), Err(Error::Conflict)));
        assert_eq!(db.stats().deadlocks, 1);
    }

    #[test]
    fn archive_safe_segments_moves_fully_committed_closed_segments() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            wal: crate::config::WalConfig {
                dir_path: dir.path().join("wal"),
                segment_size: 60, // small enough that each commit rotates
                sync_write: false,
            },
            ..Default::default()
        };
        let db = Database::open(config).unwrap();
        let setup = db.txn_begin(TxnFlags::default());
        db.table_create(&setup, "t").unwrap();
        db.txn_commit(setup).unwrap();

        for i in 0..10 {
            let txn = db.txn_begin(TxnFlags::default());
            db.put(&txn, "t", format!("k{i}").into_bytes(), b"v".to_vec()).unwrap();
            db.txn_commit(txn).unwrap();
        }

        let archived = db.archive_safe_segments().unwrap();
        assert!(archived > 0, "expected at least one closed, fully-committed segment to archive");
    }

    #[test]
    fn gc_removes_old_tombstones_once_no_reader_can_see_them() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let txn = db.txn_begin(TxnFlags::default());
        db.table_create(&txn, "t").unwrap();
        db.put(&txn, "t", b"k".to_vec(), b"v".to_vec()).unwrap();
        db.delete(&txn, "t", b"k").unwrap();
        db.txn_commit(txn).unwrap();

        db.run_gc(); // no active readers; tombstone should be collectable
        let table = db.lookup_table("t").unwrap();
        assert!(table.index.get(b"k").is_none());
    }
}

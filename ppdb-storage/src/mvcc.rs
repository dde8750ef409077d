//! Multi-version concurrency control: version chains, snapshots, visibility
//! resolution, and write-write conflict detection (§4.2).
//!
//! Each key's skiplist node owns a singly-linked chain of `Version`s, newest
//! first, linked through `prev: Option<Arc<Version>>`. Rust's `Arc` is the
//! reference count the spec asks for: a version stays alive exactly as long
//! as something (a node's head, an older version's `prev`, or a snapshot
//! reader mid-traversal) holds a clone of it.

use ppdb_core::{CommitTimestamp, Error, IsolationLevel, Result, TxnId, Value, ABORTED, IN_PROGRESS};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

/// One version of a key's value, or a tombstone if `payload` is `None`.
pub struct Version {
    /// Transaction that created this version.
    pub creator: TxnId,
    /// `IN_PROGRESS` until commit, `ABORTED` if the writer aborted,
    /// otherwise the commit timestamp assigned at commit time.
    commit_ts: AtomicU64,
    /// `None` represents a delete (a tombstone version).
    pub payload: Option<Value>,
    /// The version this one superseded, if any.
    pub prev: Option<Arc<Version>>,
}

impl Version {
    pub fn new(creator: TxnId, payload: Option<Value>, prev: Option<Arc<Version>>) -> Self {
        Self {
            creator,
            commit_ts: AtomicU64::new(IN_PROGRESS),
            payload,
            prev,
        }
    }

    pub fn commit_ts(&self) -> CommitTimestamp {
        self.commit_ts.load(AtomicOrdering::Acquire)
    }

    pub fn is_in_progress(&self) -> bool {
        self.commit_ts() == IN_PROGRESS
    }

    pub fn is_aborted(&self) -> bool {
        self.commit_ts() == ABORTED
    }

    pub fn mark_committed(&self, ts: CommitTimestamp) {
        self.commit_ts.store(ts, AtomicOrdering::Release);
    }

    pub fn mark_aborted(&self) {
        self.commit_ts.store(ABORTED, AtomicOrdering::Release);
    }

    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }
}

/// The read view captured at `txn_begin` for `RepeatableRead` and
/// `Serializable` transactions (§4.2). `ReadUncommitted`/`ReadCommitted`
/// transactions carry a snapshot too (for their own-write visibility) but
/// ignore its `commit_ts`/`active_at_start` fields when resolving reads.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub txn_id: TxnId,
    pub isolation: IsolationLevel,
    /// Highest commit timestamp visible to this snapshot.
    pub commit_ts: CommitTimestamp,
    /// Transactions still active when this snapshot was captured; their
    /// writes are invisible even if later committed at or below `commit_ts`.
    pub active_at_start: HashSet<TxnId>,
}

impl Snapshot {
    pub fn new(
        txn_id: TxnId,
        isolation: IsolationLevel,
        commit_ts: CommitTimestamp,
        active_at_start: HashSet<TxnId>,
    ) -> Self {
        Self {
            txn_id,
            isolation,
            commit_ts,
            active_at_start,
        }
    }

    /// Walks `head`'s version chain and returns the newest version visible
    /// to this snapshot, or `None` if no visible version exists (including
    /// the all-deleted/never-existed case).
    pub fn resolve<'a>(&self, head: &'a Arc<Version>) -> Option<&'a Arc<Version>> {
        let mut current = Some(head);
        while let Some(version) = current {
            if self.is_visible(version) {
                return Some(version);
            }
            current = version.prev.as_ref();
        }
        None
    }

    fn is_visible(&self, version: &Version) -> bool {
        if version.creator == self.txn_id {
            return !version.is_aborted();
        }

        match self.isolation {
            IsolationLevel::ReadUncommitted => !version.is_aborted(),
            IsolationLevel::ReadCommitted => {
                !version.is_in_progress() && !version.is_aborted()
            }
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable => {
                !version.is_in_progress()
                    && !version.is_aborted()
                    && version.commit_ts() <= self.commit_ts
                    && !self.active_at_start.contains(&version.creator)
            }
        }
    }
}

/// Checks whether `self` may install a new version on top of `observed_head`
/// (the head seen immediately before taking the node's chain-head lock).
///
/// A head still in progress under a different writer is a transient
/// condition — that writer may yet commit or abort — so it surfaces as
/// `Busy`, which the caller is expected to retry after bounded back-off (or
/// surface immediately under `no_wait`), per §4.2's no-wait/back-off policy.
/// A head already committed after this transaction's snapshot under
/// `RepeatableRead`/`Serializable` is a permanent conflict (first-committer-
/// wins): retrying cannot help, since the snapshot's view is already stale.
pub fn check_write_conflict(snapshot: &Snapshot, observed_head: Option<&Arc<Version>>) -> Result<()> {
    let Some(head) = observed_head else {
        return Ok(());
    };

    if head.creator == snapshot.txn_id {
        return Ok(());
    }

    if head.is_in_progress() {
        return Err(Error::Busy);
    }

    if matches!(
        snapshot.isolation,
        IsolationLevel::RepeatableRead | IsolationLevel::Serializable
    ) && !head.is_aborted()
        && head.commit_ts() > snapshot.commit_ts
    {
        return Err(Error::Conflict);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed(creator: TxnId, ts: CommitTimestamp, payload: &[u8]) -> Arc<Version> {
        let v = Version::new(creator, Some(payload.to_vec()), None);
        v.mark_committed(ts);
        Arc::new(v)
    }

    #[test]
    fn read_committed_sees_only_committed() {
        let uncommitted = Arc::new(Version::new(2, Some(b"new".to_vec()), None));
        let base = committed(1, 10, b"old");
        let chained = Arc::new(Version::new(2, Some(b"new".to_vec()), Some(base.clone())));
        let _ = uncommitted;

        let snap = Snapshot::new(
            99,
            IsolationLevel::ReadCommitted,
            u64::MAX,
            HashSet::new(),
        );
        let resolved = snap.resolve(&chained).unwrap();
        assert_eq!(resolved.payload.as_deref(), Some(b"old".as_slice()));
    }

    #[test]
    fn repeatable_read_ignores_writes_after_snapshot() {
        let base = committed(1, 10, b"old");
        let newer = committed(2, 20, b"new");
        let chained = Arc::new(Version {
            prev: Some(base),
            ..(*newer).clone_for_test()
        });

        let snap = Snapshot::new(
            99,
            IsolationLevel::RepeatableRead,
            15,
            HashSet::new(),
        );
        let resolved = snap.resolve(&chained).unwrap();
        assert_eq!(resolved.payload.as_deref(), Some(b"old".as_slice()));
    }

    #[test]
    fn own_uncommitted_write_is_visible_to_self() {
        let v = Arc::new(Version::new(5, Some(b"mine".to_vec()), None));
        let snap = Snapshot::new(5, IsolationLevel::Serializable, 0, HashSet::new());
        assert!(snap.resolve(&v).is_some());
    }

    #[test]
    fn active_writer_at_snapshot_start_is_invisible_even_if_committed_later() {
        let mut active = HashSet::new();
        active.insert(2);
        let v = committed(2, 5, b"v");
        let snap = Snapshot::new(99, IsolationLevel::Serializable, 100, active);
        assert!(snap.resolve(&v).is_none());
    }

    #[test]
    fn busy_on_in_progress_foreign_head() {
        let head = Arc::new(Version::new(2, Some(b"x".to_vec()), None));
        let snap = Snapshot::new(1, IsolationLevel::Serializable, 0, HashSet::new());
        assert!(matches!(
            check_write_conflict(&snap, Some(&head)),
            Err(Error::Busy)
        ));
    }

    #[test]
    fn conflict_on_commit_after_snapshot_under_serializable() {
        let head = committed(2, 50, b"x");
        let snap = Snapshot::new(1, IsolationLevel::Serializable, 10, HashSet::new());
        assert!(matches!(
            check_write_conflict(&snap, Some(&head)),
            Err(Error::Conflict)
        ));
    }

    #[test]
    fn no_conflict_when_head_is_own_write() {
        let head = Arc::new(Version::new(1, Some(b"x".to_vec()), None));
        let snap = Snapshot::new(1, IsolationLevel::Serializable, 0, HashSet::new());
        assert!(check_write_conflict(&snap, Some(&head)).is_ok());
    }

    // Test-only helper: `Version` has no real `Clone` (chains are meant to be
    // built once and shared via `Arc`), but constructing a synthetic chain in
    // `repeatable_read_ignores_writes_after_snapshot` needs to splice a new
    // `prev` onto an already-built version.
    impl Version {
        fn clone_for_test(&self) -> Version {
            Version {
                creator: self.creator,
                commit_ts: AtomicU64::new(self.commit_ts()),
                payload: self.payload.clone(),
                prev: self.prev.clone(),
            }
        }
    }
}

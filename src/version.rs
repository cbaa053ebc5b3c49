//! Per-node version counters used for redraw invalidation.
//!
//! Counters are kept in a vector parallel to the tree arena and indexed
//! by slot, so a counter is tied to node identity without pinning node
//! lifetime: removing a node tombstones its slot, and a later node
//! reusing that slot simply continues the counter (still monotonic per
//! slot, which is all invalidation needs). Counters are never persisted.

use crate::node::NodeIdx;

#[derive(Debug, Default)]
pub struct VersionTable {
    counters: Vec<u64>,
}

impl VersionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter for a slot, creating it lazily, and return
    /// the new value.
    pub fn bump(&mut self, idx: NodeIdx) -> u64 {
        let idx = idx as usize;
        if idx >= self.counters.len() {
            self.counters.resize(idx + 1, 0);
        }
        self.counters[idx] += 1;
        self.counters[idx]
    }

    /// Current counter for a slot (zero if never bumped).
    pub fn get(&self, idx: NodeIdx) -> u64 {
        self.counters.get(idx as usize).copied().unwrap_or(0)
    }

    /// Drop all counters. Only used on session reset; mid-session the
    /// table survives node removal so reused slots stay monotonic.
    pub fn clear(&mut self) {
        self.counters.clear();
    }
}

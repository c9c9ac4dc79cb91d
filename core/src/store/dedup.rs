// Dedup cache: message sids already observed by this bridge
//
// Used to decide whether a chat message is being seen for the first time
// or is a repeat that has to be pushed out to the mesh.

use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Ordered set of seen sids.
///
/// Unbounded unless built with `with_capacity_limit`, in which case the
/// oldest sid is forgotten once the limit is exceeded.
#[derive(Debug, Default)]
pub struct DedupCache {
    /// Set of seen sids (for O(1) membership)
    seen: HashSet<String>,
    /// Sids in insertion order (for FIFO eviction)
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl DedupCache {
    /// Unbounded cache: sids are never forgotten
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache that remembers at most `capacity` sids
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    /// Has `sid` been recorded?
    pub fn seen(&self, sid: &str) -> bool {
        self.seen.contains(sid)
    }

    /// Record `sid`. Recording a sid twice is a no-op.
    pub fn record(&mut self, sid: &str) {
        self.check_and_record(sid);
    }

    /// Record `sid` and report whether it was new.
    pub fn check_and_record(&mut self, sid: &str) -> bool {
        if self.seen.contains(sid) {
            return false;
        }

        self.seen.insert(sid.to_string());
        self.order.push_back(sid.to_string());

        if let Some(capacity) = self.capacity {
            while self.order.len() > capacity {
                if let Some(old) = self.order.pop_front() {
                    self.seen.remove(&old);
                    debug!("Dedup cache full, forgot sid {}", old);
                }
            }
        }

        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Sids in the order they were first recorded
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

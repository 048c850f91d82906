//! Segment activation bookkeeping.
//!
//! A segment is active while it has work for the link phase (a non-empty
//! running queue).  Workers track their own active lists; this ledger is the
//! container-level view, updated only inside the separation barrier's
//! single-threaded action and read by the coordinator after the end barrier.
//! It never participates in movement decisions — pure bookkeeping.

use rustc_hash::FxHashSet;

use flow_core::SegmentId;

/// Container-level record of which segments currently have work to do.
#[derive(Default)]
pub struct ActivationLedger {
    active: FxHashSet<SegmentId>,
    newly: Vec<SegmentId>,
}

impl ActivationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `segment` active.  Idempotent; re-activating an already active
    /// segment records nothing.
    pub fn activate(&mut self, segment: SegmentId) {
        if self.active.insert(segment) {
            self.newly.push(segment);
        }
    }

    /// Mark `segment` inactive.  Idempotent.
    pub fn deactivate(&mut self, segment: SegmentId) {
        self.active.remove(&segment);
    }

    /// `true` while `segment` is marked active.
    pub fn is_active(&self, segment: SegmentId) -> bool {
        self.active.contains(&segment)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Drain the list of segments that became active since the last call,
    /// in id order.
    pub fn collect_newly_activated(&mut self) -> Vec<SegmentId> {
        let mut out = std::mem::take(&mut self.newly);
        out.sort_unstable();
        out.dedup();
        out
    }
}

//! Cross-partition occupancy mirror.
//!
//! Workers may only mutate segments they own, but the node phase must answer
//! "does the downstream segment have space?" for segments owned by *other*
//! workers.  The mirror provides that answer without locks: a flat array of
//! per-segment occupant counts that is authoritative at every tick boundary
//! and frozen during a tick.
//!
//! Write discipline:
//! - The coordinator overwrites counts from the owners' reports after the
//!   end barrier, and increments them for admitted departures before the
//!   start barrier.  Workers are parked at a barrier in both windows.
//! - During a tick, workers only read.  Same-tick additions to a segment can
//!   come from exactly one place — its upstream node — so that node's local
//!   reservation count plus the mirror is an exact occupancy bound, and the
//!   result cannot depend on node processing order or worker count.
//!
//! Capacity freed during a tick (buffer pops, arrivals) reaches the mirror
//! at the next boundary, i.e. space opens up one tick later.  That delay is
//! deliberate: it is what keeps `has_space` deterministic.
//!
//! The barriers provide all ordering, so the atomics are relaxed.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use flow_core::SegmentId;

/// Shared per-segment occupancy counts plus static storage capacities.
///
/// Cheap to clone (two `Arc`s); every worker and the coordinator hold one.
#[derive(Clone)]
pub struct OccupancyMirror {
    counts: Arc<Vec<AtomicU32>>,
    caps: Arc<Vec<f64>>,
}

impl OccupancyMirror {
    /// Create a mirror with all counts zero and the given storage capacities.
    pub fn new(caps: Vec<f64>) -> Self {
        let counts = (0..caps.len()).map(|_| AtomicU32::new(0)).collect();
        Self {
            counts: Arc::new(counts),
            caps: Arc::new(caps),
        }
    }

    pub fn segment_count(&self) -> usize {
        self.caps.len()
    }

    /// Occupants (running + buffered) of `segment` as of the last boundary.
    #[inline]
    pub fn occupancy(&self, segment: SegmentId) -> u32 {
        self.counts[segment.index()].load(Ordering::Relaxed)
    }

    /// Storage capacity of `segment` in vehicles.
    #[inline]
    pub fn cap(&self, segment: SegmentId) -> f64 {
        self.caps[segment.index()]
    }

    /// Would `segment` accept one more vehicle, given `reserved` additional
    /// same-tick entries already claimed by the caller?
    #[inline]
    pub fn has_space(&self, segment: SegmentId, reserved: u32) -> bool {
        let occupied = self.occupancy(segment) + reserved;
        (occupied as f64) < self.cap(segment)
    }

    /// Overwrite the count for `segment`.  Coordinator only, between ticks.
    #[inline]
    pub fn set(&self, segment: SegmentId, count: u32) {
        self.counts[segment.index()].store(count, Ordering::Relaxed);
    }

    /// Add an admitted departure to `segment`.  Coordinator only, between
    /// ticks.
    #[inline]
    pub fn add(&self, segment: SegmentId, n: u32) {
        self.counts[segment.index()].fetch_add(n, Ordering::Relaxed);
    }
}

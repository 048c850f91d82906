//! Per-tick signal state snapshot, readable from worker threads without locks.

use std::sync::atomic::{AtomicU8, Ordering};

use rustc_hash::FxHashMap;

use flow_core::{NodeId, SegmentId, Tick};

use crate::SignalControl;

// ── SignalState ───────────────────────────────────────────────────────────────

/// Traversal eligibility of one approach at one tick.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SignalState {
    Go,
    Stop,
}

const GO: u8 = 0;
const STOP: u8 = 1;

// ── SignalTable ───────────────────────────────────────────────────────────────

/// Snapshot of every registered approach's signal state.
///
/// An approach is a `(node, incoming segment)` pair at a signalized node.
/// The table is written only by the coordinator between ticks
/// ([`refresh`](Self::refresh)) and read by workers during the node phase;
/// the tick barriers provide the ordering, so all atomic access is relaxed.
pub struct SignalTable {
    index:  FxHashMap<(NodeId, SegmentId), u32>,
    states: Vec<AtomicU8>,
}

impl SignalTable {
    /// Build a table covering `approaches`.  Duplicates are collapsed.
    pub fn new(approaches: &[(NodeId, SegmentId)]) -> Self {
        let mut index = FxHashMap::default();
        for &key in approaches {
            let next = index.len() as u32;
            index.entry(key).or_insert(next);
        }
        let states = (0..index.len()).map(|_| AtomicU8::new(GO)).collect();
        Self { index, states }
    }

    /// Number of registered approaches.
    pub fn approach_count(&self) -> usize {
        self.index.len()
    }

    /// Current state of the approach `(node, segment)`.
    ///
    /// Unregistered approaches are permanently [`SignalState::Go`].
    #[inline]
    pub fn state(&self, node: NodeId, segment: SegmentId) -> SignalState {
        match self.index.get(&(node, segment)) {
            None => SignalState::Go,
            Some(&i) => match self.states[i as usize].load(Ordering::Relaxed) {
                STOP => SignalState::Stop,
                _ => SignalState::Go,
            },
        }
    }

    /// Re-query `controller` for every registered approach and store the
    /// result.  Called by the coordinator between ticks, never concurrently
    /// with worker reads.
    pub fn refresh(&self, controller: &dyn SignalControl, now: Tick) {
        for (&(node, segment), &i) in &self.index {
            let v = match controller.state(node, segment, now) {
                SignalState::Go => GO,
                SignalState::Stop => STOP,
            };
            self.states[i as usize].store(v, Ordering::Relaxed);
        }
    }
}

//! The `SignalControl` trait and the built-in controllers.

use rustc_hash::FxHashMap;

use flow_core::{NodeId, SegmentId, Tick};

use crate::SignalState;

// ── SignalControl ─────────────────────────────────────────────────────────────

/// Pluggable signal control.
///
/// The coordinator calls [`sim_step`](Self::sim_step) once per tick before
/// the node phase, then snapshots [`state`](Self::state) for every approach
/// into the [`SignalTable`](crate::SignalTable).  Implementations therefore
/// never run on worker threads and need no internal synchronisation; they
/// must be `Send` so the engine owning them can be moved between threads.
///
/// Determinism: `state` must be a pure function of the controller's own
/// state and `now` — the same controller fed the same tick sequence must
/// answer identically on every run.
pub trait SignalControl: Send {
    /// Advance the controller's internal state to `now`.
    ///
    /// Default: nothing to advance (time-based controllers derive everything
    /// from `now` in [`state`](Self::state)).
    fn sim_step(&mut self, _now: Tick) {}

    /// State of the approach `(node, segment)` at `now`.
    fn state(&self, node: NodeId, segment: SegmentId, now: Tick) -> SignalState;

    /// Every approach this controller has an explicit plan for.
    ///
    /// The engine validates these against the network at build time, so a
    /// plan referencing a missing node or a segment that does not feed the
    /// node is rejected before the run starts.
    fn referenced_approaches(&self) -> Vec<(NodeId, SegmentId)> {
        vec![]
    }
}

// ── AlwaysGreen ───────────────────────────────────────────────────────────────

/// Controller that never shows Stop.  The default when no controller is
/// injected.
pub struct AlwaysGreen;

impl SignalControl for AlwaysGreen {
    fn state(&self, _node: NodeId, _segment: SegmentId, _now: Tick) -> SignalState {
        SignalState::Go
    }
}

// ── FixedTimeControl ──────────────────────────────────────────────────────────

/// Cyclic green window for one approach.
///
/// The approach is Go while `(now + offset) % cycle` falls inside
/// `[green_from, green_until)` and Stop otherwise.
#[derive(Copy, Clone, Debug)]
pub struct ApproachPlan {
    /// Cycle length in ticks.  Must be > 0.
    pub cycle_ticks: u64,
    /// Start of the green window within the cycle (inclusive).
    pub green_from: u64,
    /// End of the green window within the cycle (exclusive).
    pub green_until: u64,
    /// Phase offset in ticks, added to the tick before the modulo.
    pub offset_ticks: u64,
}

impl ApproachPlan {
    fn state_at(&self, now: Tick) -> SignalState {
        let pos = (now.0 + self.offset_ticks) % self.cycle_ticks.max(1);
        if pos >= self.green_from && pos < self.green_until {
            SignalState::Go
        } else {
            SignalState::Stop
        }
    }
}

/// Pre-timed signal plans, one per controlled approach.
///
/// Approaches without a plan fall back to Go, so a partially signalized
/// intersection only needs plans for the metered approaches.
#[derive(Default)]
pub struct FixedTimeControl {
    plans: FxHashMap<(NodeId, SegmentId), ApproachPlan>,
}

impl FixedTimeControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the plan for the approach `(node, segment)`.
    pub fn with_plan(mut self, node: NodeId, segment: SegmentId, plan: ApproachPlan) -> Self {
        self.plans.insert((node, segment), plan);
        self
    }

    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }
}

impl SignalControl for FixedTimeControl {
    fn state(&self, node: NodeId, segment: SegmentId, now: Tick) -> SignalState {
        match self.plans.get(&(node, segment)) {
            Some(plan) => plan.state_at(now),
            None => SignalState::Go,
        }
    }

    fn referenced_approaches(&self) -> Vec<(NodeId, SegmentId)> {
        let mut keys: Vec<_> = self.plans.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

//! `SimNode` — vehicle transfer across one intersection.
//!
//! A node never holds vehicles: it pops the heads of its incoming segments'
//! exit buffers and hands them to their next segments.  The only state a
//! node carries is its topology cache and its private RNG — the property
//! that makes node partitioning trivial.
//!
//! All segments a node pops from are owned by the node's worker (segments
//! are attached to the worker of their destination node), so the node phase
//! mutates only worker-local data.  Entries into downstream segments — which
//! may belong to other workers — leave here as [`SegmentEntry`] values and
//! are applied by the owning worker at the separation barrier.

use rustc_hash::FxHashMap;

use flow_core::{EventKind, NodeId, NodeRng, SegmentId, Tick, Vehicle};
use flow_signals::{SignalState, SignalTable};

use crate::{OccupancyMirror, SimSegment};

// ── SegmentEntry ──────────────────────────────────────────────────────────────

/// A vehicle crossing onto `segment`, to be enqueued by the segment's owner.
///
/// `seq` preserves the producing node's pop order: a segment receives
/// entries from exactly one node per tick, so sorting by `(segment, seq)`
/// reconstructs arrival order exactly no matter how entries travelled
/// through the exchange.
#[derive(Debug)]
pub struct SegmentEntry {
    pub segment: SegmentId,
    pub seq: u32,
    pub vehicle: Vehicle,
}

// ── NodeScratch ───────────────────────────────────────────────────────────────

/// Per-worker scratch space for node advances, reused across nodes to avoid
/// per-node allocation.  The worker drains the output lists after each
/// `advance` call.
#[derive(Default)]
pub struct NodeScratch {
    /// Events in emission order (the worker assigns producer/sequence keys).
    pub events: Vec<EventKind>,
    /// Vehicles crossing onto a next segment.
    pub crossings: Vec<SegmentEntry>,
    /// `(segment, vehicle)` trips that ended at this node.
    pub arrived: Vec<(SegmentId, Vehicle)>,
    /// `(segment, vehicle)` forcibly removed as stuck.
    pub stuck: Vec<(SegmentId, Vehicle)>,
    /// Segments whose occupancy changed (buffer pops).
    pub dirty: Vec<SegmentId>,
    /// Same-tick entries claimed per downstream segment.
    reserved: FxHashMap<SegmentId, u32>,
    /// Approach permutation scratch.
    order: Vec<u32>,
}

impl NodeScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when every output list is empty (after the worker drained it).
    pub fn is_drained(&self) -> bool {
        self.events.is_empty()
            && self.crossings.is_empty()
            && self.arrived.is_empty()
            && self.stuck.is_empty()
            && self.dirty.is_empty()
    }
}

// ── SimNode ───────────────────────────────────────────────────────────────────

/// One intersection, ready to advance vehicles each tick.
pub struct SimNode {
    id: NodeId,
    signalized: bool,
    /// Incoming segments, cached from the network CSR at partition build.
    in_segments: Box<[SegmentId]>,
    rng: NodeRng,
    /// Entry sequence counter, reset every advance.
    seq: u32,
}

impl SimNode {
    pub fn new(id: NodeId, signalized: bool, in_segments: Box<[SegmentId]>, rng: NodeRng) -> Self {
        Self {
            id,
            signalized,
            in_segments,
            rng,
            seq: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn in_segments(&self) -> &[SegmentId] {
        &self.in_segments
    }

    /// `true` if any incoming segment has buffered vehicles — the condition
    /// for keeping the node on the active list.
    pub fn has_buffered(&self, segments: &FxHashMap<SegmentId, SimSegment>) -> bool {
        self.in_segments
            .iter()
            .any(|seg| segments.get(seg).is_some_and(|s| !s.exit_buffer_is_empty()))
    }

    /// Advance vehicles across this node for one tick.
    ///
    /// Incoming segments are processed in an order permuted once per tick by
    /// the node's private RNG, so no approach is systematically favored and
    /// the permutation sequence is independent of worker count.  Per
    /// approach, the exit buffer drains head-first:
    ///
    /// 1. A head that has waited longer than `max_wait` ticks is forcibly
    ///    removed as stuck (this applies even while the signal shows Stop).
    /// 2. A Stop signal blocks the whole approach for this tick.
    /// 3. A head whose route is exhausted ends its trip here (defensive —
    ///    the normal arrival path is the link phase).
    /// 4. Otherwise the head crosses iff its next segment has space, judged
    ///    from the occupancy mirror plus this node's own reservations.  A
    ///    blocked head blocks every vehicle behind it (spillback).
    pub fn advance(
        &mut self,
        now: Tick,
        segments: &mut FxHashMap<SegmentId, SimSegment>,
        mirror: &OccupancyMirror,
        signals: &SignalTable,
        max_wait: Option<u64>,
        out: &mut NodeScratch,
    ) {
        debug_assert!(out.is_drained(), "scratch not drained before advance");
        out.reserved.clear();
        self.seq = 0;

        out.order.clear();
        out.order.extend(0..self.in_segments.len() as u32);
        self.rng.shuffle(&mut out.order);

        for i in 0..out.order.len() {
            let seg_id = self.in_segments[out.order[i] as usize];
            let go =
                !self.signalized || signals.state(self.id, seg_id) == SignalState::Go;
            let Some(seg) = segments.get_mut(&seg_id) else {
                continue;
            };

            loop {
                let (waited, next) = match seg.buffer_head() {
                    None => break,
                    Some(head) => (now.since(head.buffered_at), head.next_segment()),
                };

                if max_wait.is_some_and(|limit| waited > limit) {
                    if let Some(v) = seg.pop_buffer() {
                        out.events.push(EventKind::Stuck {
                            segment: seg_id,
                            node: self.id,
                            vehicle: v.id,
                            agent: v.agent,
                        });
                        out.dirty.push(seg_id);
                        out.stuck.push((seg_id, v));
                    }
                    continue;
                }

                if !go {
                    break;
                }

                let Some(next) = next else {
                    if let Some(v) = seg.pop_buffer() {
                        out.events.push(EventKind::Arrived {
                            segment: seg_id,
                            vehicle: v.id,
                            agent: v.agent,
                        });
                        out.dirty.push(seg_id);
                        out.arrived.push((seg_id, v));
                    }
                    continue;
                };

                let reserved = out.reserved.get(&next).copied().unwrap_or(0);
                if !mirror.has_space(next, reserved) {
                    break;
                }

                let Some(mut v) = seg.pop_buffer() else { break };
                v.advance_route();
                *out.reserved.entry(next).or_insert(0) += 1;
                out.events.push(EventKind::SegmentLeave {
                    segment: seg_id,
                    vehicle: v.id,
                });
                out.events.push(EventKind::SegmentEnter {
                    segment: next,
                    vehicle: v.id,
                });
                out.dirty.push(seg_id);
                out.crossings.push(SegmentEntry {
                    segment: next,
                    seq: self.seq,
                    vehicle: v,
                });
                self.seq += 1;
            }
        }
    }
}

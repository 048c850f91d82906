//! The worker runner: one thread, one partition, the two-phase tick loop.
//!
//! # Loop shape
//!
//! ```text
//! loop {
//!   wait(start)                       // coordinator published the tick
//!   inject phase   — apply admitted departures to owned segments
//!   node phase     — advance_node for every (active) owned node
//!   deposit outboxes; wait(separation); collect own entries; apply them
//!   link phase     — advance every (active) owned segment
//!   deposit events/occupancy/arrivals/stuck; wait(end)
//! }
//! ```
//!
//! A panic inside any phase is caught, recorded in the shared error slot,
//! and the runner still honors the remaining barriers of the tick so its
//! siblings and the coordinator cannot deadlock; the coordinator turns the
//! recorded error into a fatal `EngineError::RunnerFailed`.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use flow_core::{EngineConfig, Event, EventKind, NodeId, SegmentId, Tick};
use flow_net::{Network, NodeScratch, OccupancyMirror, SegmentEntry};
use flow_signals::SignalTable;

use crate::exchange::{KeyedEvent, Shared, PHASE_INJECT, PHASE_LINK, PHASE_NODE};
use crate::partition::{segment_partition, Partition};
use crate::{StuckRemoval, TripEnd};

pub(crate) struct Runner {
    index: usize,
    partitions: usize,
    shared: Arc<Shared>,
    net: Arc<Network>,
    cfg: Arc<EngineConfig>,
    mirror: OccupancyMirror,
    signals: Arc<SignalTable>,
    max_wait: Option<u64>,
    part: Partition,

    // ── Tick-local state, drained at the barriers ─────────────────────────
    scratch: NodeScratch,
    /// Per-destination-partition crossing outboxes.
    outboxes: Vec<Vec<SegmentEntry>>,
    events: Vec<KeyedEvent>,
    /// Per-(phase, producer) emission counters for event keys.
    seqs: FxHashMap<(u8, u32), u32>,
    /// Owned segments whose occupancy changed this tick.
    dirty: BTreeSet<SegmentId>,
    activated: Vec<SegmentId>,
    deactivated: Vec<SegmentId>,
    arrived: Vec<TripEnd>,
    stuck: Vec<StuckRemoval>,
}

impl Runner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        partitions: usize,
        shared: Arc<Shared>,
        net: Arc<Network>,
        cfg: Arc<EngineConfig>,
        mirror: OccupancyMirror,
        signals: Arc<SignalTable>,
        part: Partition,
    ) -> Self {
        let max_wait = cfg.max_wait_ticks();
        Self {
            index,
            partitions,
            shared,
            net,
            cfg,
            mirror,
            signals,
            max_wait,
            part,
            scratch: NodeScratch::new(),
            outboxes: (0..partitions).map(|_| Vec::new()).collect(),
            events: Vec::new(),
            seqs: FxHashMap::default(),
            dirty: BTreeSet::new(),
            activated: Vec::new(),
            deactivated: Vec::new(),
            arrived: Vec::new(),
            stuck: Vec::new(),
        }
    }

    /// Thread body.  Returns when the coordinator raises the stop flag.
    pub fn run(mut self) {
        loop {
            self.shared.start.wait();
            if self.shared.stop.load(Ordering::Relaxed) {
                break;
            }
            let now = Tick(self.shared.tick.load(Ordering::Relaxed));

            let ok = self.guarded(|r| {
                r.inject_phase(now);
                r.node_phase(now);
            });

            self.separation_point(now, ok);

            if ok {
                self.guarded(|r| r.link_phase(now));
            }

            self.end_point();
        }
    }

    /// Run `f`, converting a panic into a recorded fatal error.
    fn guarded<F: FnOnce(&mut Self)>(&mut self, f: F) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| f(self))) {
            Ok(()) => true,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "worker panicked".to_string());
                log::error!("runner {} failed: {message}", self.index);
                self.shared.record_error(message);
                false
            }
        }
    }

    fn push_event(&mut self, phase: u8, producer: u32, now: Tick, kind: EventKind) {
        let seq = self.seqs.entry((phase, producer)).or_insert(0);
        self.events.push(KeyedEvent {
            phase,
            producer,
            seq: *seq,
            event: Event { time: now, kind },
        });
        *seq += 1;
    }

    fn activate_segment(&mut self, segment: SegmentId) {
        if self.part.active_segments.insert(segment) {
            self.activated.push(segment);
        }
    }

    // ── Inject phase ──────────────────────────────────────────────────────

    /// Apply departures the coordinator admitted for this partition.
    ///
    /// Admission already reserved storage against the mirror, so space is
    /// guaranteed.  A ripe departure (zero remaining free-flow time) is
    /// promoted straight into the exit buffer so it can cross its first node
    /// this very tick.
    fn inject_phase(&mut self, now: Tick) {
        let inbox = {
            let mut ex = self.shared.lock_exchange();
            std::mem::take(&mut ex.inject[self.index])
        };
        for (seg_id, vehicle) in inbox {
            let vid = vehicle.id;
            let Some(seg) = self.part.segments.get_mut(&seg_id) else {
                continue;
            };
            seg.refresh(now, &self.cfg);
            debug_assert!(seg.has_space(), "admission reserved space on {seg_id}");
            seg.enqueue(vehicle, now);
            let promoted = seg.promote_ripe(now);
            let queue_active = seg.queue_len() > 0;
            let has_buffered = !seg.exit_buffer_is_empty();

            self.push_event(PHASE_INJECT, seg_id.0, now, EventKind::Departed {
                segment: seg_id,
                vehicle: vid,
            });
            self.push_event(PHASE_INJECT, seg_id.0, now, EventKind::SegmentEnter {
                segment: seg_id,
                vehicle: vid,
            });
            for v in promoted {
                self.push_event(PHASE_INJECT, seg_id.0, now, EventKind::SegmentFlow {
                    segment: seg_id,
                    vehicle: v,
                });
            }
            self.dirty.insert(seg_id);
            if queue_active {
                self.activate_segment(seg_id);
            }
            if has_buffered && !self.cfg.eager_nodes {
                self.part.active_nodes.insert(self.net.to(seg_id));
            }
        }
    }

    // ── Node phase ────────────────────────────────────────────────────────

    fn node_phase(&mut self, now: Tick) {
        let ids: Vec<NodeId> = if self.cfg.eager_nodes {
            self.part.nodes.iter().map(|n| n.id()).collect()
        } else {
            self.part.active_nodes.iter().copied().collect()
        };

        for id in ids {
            let Some(&pos) = self.part.node_pos.get(&id) else {
                continue;
            };
            self.part.nodes[pos].advance(
                now,
                &mut self.part.segments,
                &self.mirror,
                &self.signals,
                self.max_wait,
                &mut self.scratch,
            );
            self.drain_node_scratch(id, now);
            if !self.cfg.eager_nodes
                && !self.part.nodes[pos].has_buffered(&self.part.segments)
            {
                self.part.active_nodes.remove(&id);
            }
        }
    }

    fn drain_node_scratch(&mut self, node: NodeId, now: Tick) {
        for kind in std::mem::take(&mut self.scratch.events) {
            self.push_event(PHASE_NODE, node.0, now, kind);
        }
        for entry in std::mem::take(&mut self.scratch.crossings) {
            let owner = segment_partition(&self.net, entry.segment, self.partitions);
            self.outboxes[owner].push(entry);
        }
        for (segment, v) in std::mem::take(&mut self.scratch.arrived) {
            self.arrived.push(TripEnd { vehicle: v.id, agent: v.agent, segment });
        }
        for (segment, v) in std::mem::take(&mut self.scratch.stuck) {
            log::debug!("vehicle {} stuck on {} at {}", v.id, segment, now);
            self.stuck.push(StuckRemoval { vehicle: v.id, agent: v.agent, segment, node });
        }
        for segment in std::mem::take(&mut self.scratch.dirty) {
            self.dirty.insert(segment);
        }
    }

    // ── Separation barrier ────────────────────────────────────────────────

    /// Deposit crossings and activation reports, rendezvous, then collect
    /// and apply the entries destined for this partition's segments.  This
    /// hand-off is what makes every node-phase enqueue visible to the link
    /// phase that follows.
    fn separation_point(&mut self, now: Tick, apply: bool) {
        {
            let mut ex = self.shared.lock_exchange();
            for (p, outbox) in self.outboxes.iter_mut().enumerate() {
                ex.entries[p].append(outbox);
            }
            ex.activated[self.index].append(&mut self.activated);
            ex.deactivated[self.index].append(&mut self.deactivated);
        }

        let result = self.shared.separation.wait();
        if result.is_leader() {
            // Single-threaded action: fold every partition's activation
            // reports into the container ledger.
            let mut ex = self.shared.lock_exchange();
            let exchange = &mut *ex;
            for bin in &mut exchange.activated {
                for segment in bin.drain(..) {
                    exchange.ledger.activate(segment);
                }
            }
            for bin in &mut exchange.deactivated {
                for segment in bin.drain(..) {
                    exchange.ledger.deactivate(segment);
                }
            }
        }

        let mine = {
            let mut ex = self.shared.lock_exchange();
            std::mem::take(&mut ex.entries[self.index])
        };
        if apply {
            self.guarded(|r| r.apply_entries(mine, now));
        }
    }

    /// Enqueue vehicles that crossed into this partition's segments.
    ///
    /// `(segment, seq)` sorting reconstructs each upstream node's pop order;
    /// a segment receives entries from exactly one node per tick, so this is
    /// a total order.  The crossing node already checked space (mirror +
    /// reservations) and emitted the enter event.
    fn apply_entries(&mut self, mut entries: Vec<SegmentEntry>, now: Tick) {
        entries.sort_by_key(|e| (e.segment, e.seq));
        for entry in entries {
            let seg_id = entry.segment;
            let Some(seg) = self.part.segments.get_mut(&seg_id) else {
                continue;
            };
            seg.refresh(now, &self.cfg);
            debug_assert!(seg.has_space(), "crossing reserved space on {seg_id}");
            seg.enqueue(entry.vehicle, now);
            self.dirty.insert(seg_id);
            self.activate_segment(seg_id);
        }
    }

    // ── Link phase ────────────────────────────────────────────────────────

    fn link_phase(&mut self, now: Tick) {
        let ids: Vec<SegmentId> = if self.cfg.eager_segments {
            self.part.all_segments.clone()
        } else {
            self.part.active_segments.iter().copied().collect()
        };

        for seg_id in ids {
            let Some(seg) = self.part.segments.get_mut(&seg_id) else {
                continue;
            };
            let out = seg.advance(now, &self.cfg);
            let has_buffered = !seg.exit_buffer_is_empty();

            for vehicle in out.flowed {
                self.push_event(PHASE_LINK, seg_id.0, now, EventKind::SegmentFlow {
                    segment: seg_id,
                    vehicle,
                });
            }
            for v in out.arrivals {
                self.push_event(PHASE_LINK, seg_id.0, now, EventKind::Arrived {
                    segment: seg_id,
                    vehicle: v.id,
                    agent: v.agent,
                });
                self.arrived.push(TripEnd { vehicle: v.id, agent: v.agent, segment: seg_id });
                self.dirty.insert(seg_id);
            }
            if has_buffered && !self.cfg.eager_nodes {
                self.part.active_nodes.insert(self.net.to(seg_id));
            }
            if !out.active && !self.cfg.eager_segments && self.part.active_segments.remove(&seg_id)
            {
                self.deactivated.push(seg_id);
            }
        }
    }

    // ── End barrier ───────────────────────────────────────────────────────

    fn end_point(&mut self) {
        {
            let mut ex = self.shared.lock_exchange();
            ex.events[self.index].append(&mut self.events);
            let occupancy = &mut ex.occupancy[self.index];
            for &segment in &self.dirty {
                if let Some(seg) = self.part.segments.get(&segment) {
                    occupancy.push((segment, seg.stored()));
                }
            }
            ex.arrived[self.index].append(&mut self.arrived);
            ex.stuck[self.index].append(&mut self.stuck);
        }
        self.dirty.clear();
        self.seqs.clear();
        self.shared.end.wait();
    }
}

//! `SimSegment` — the queue model for one directional road segment.
//!
//! # Queue anatomy
//!
//! ```text
//!          running queue                exit buffer
//!   ┌────────────────────────┐   ┌─────────────────────┐
//! ──▶ v5   v4   v3           │──▶│ v2   v1             │──▶ downstream node
//!   └────────────────────────┘   └─────────────────────┘
//!     entry order preserved        ≤ buffer_cap slots
//! ```
//!
//! Vehicles enter the running queue with a scheduled exit time (entry tick +
//! free-flow travel ticks).  The link phase moves ripe vehicles into the
//! exit buffer, one unit of flow capacity each; the downstream node pops the
//! buffer during the next node phase.  Both queues are strict FIFO and only
//! the head's exit time gates release, so vehicles can never overtake even
//! when a time-variant change shortens the free-flow time mid-stream.
//!
//! # Flow capacity carry-over
//!
//! Fractional flow capacity accumulates each tick and releases one vehicle
//! whenever the accumulator reaches 1.0, subtracting 1.0.  The accumulator
//! is capped at `max(flow_per_tick, 1.0)` so idle segments cannot hoard
//! capacity, while segments with less than one vehicle/tick still release a
//! vehicle periodically.
//!
//! # Ownership
//!
//! A `SimSegment` is owned by the worker of its destination node for the
//! whole run.  `stored` is the authoritative occupancy; other workers see it
//! through the [`OccupancyMirror`](crate::OccupancyMirror) one tick later.

use std::collections::VecDeque;

use flow_core::{EngineConfig, SegmentId, Tick, Vehicle, VehicleId};

use crate::{ChangeValue, Network, SegmentAttrs, SegmentParams};

// ── LinkOutcome ───────────────────────────────────────────────────────────────

/// What one `advance` call did.
#[derive(Debug, Default)]
pub struct LinkOutcome {
    /// Vehicles moved into the exit buffer, in release order.
    pub flowed: Vec<VehicleId>,
    /// Vehicles that finished their route on this segment, in release order.
    pub arrivals: Vec<Vehicle>,
    /// `true` while the segment still has pending link-phase work (a
    /// non-empty running queue).  `false` lets the owner deactivate it.
    pub active: bool,
}

// ── SimSegment ────────────────────────────────────────────────────────────────

/// Mutable queue state for one segment.
pub struct SimSegment {
    id: SegmentId,
    attrs: SegmentAttrs,
    params: SegmentParams,
    changes: Vec<crate::AttributeChange>,
    next_change: usize,

    queue: VecDeque<Vehicle>,
    buffer: VecDeque<Vehicle>,
    /// Occupants: running + buffered.  Authoritative; mirrored at boundaries.
    stored: u32,
    flow_acc: f64,
    last_refresh: Tick,
}

impl SimSegment {
    /// Create the segment's simulation state from the network's static data.
    pub fn new(id: SegmentId, network: &Network, cfg: &EngineConfig) -> Self {
        let attrs = network.attrs(id);
        let params = SegmentParams::derive(&attrs, cfg);
        Self {
            id,
            attrs,
            params,
            changes: network.changes_for(id).to_vec(),
            next_change: 0,
            queue: VecDeque::new(),
            buffer: VecDeque::new(),
            stored: 0,
            // A fresh segment starts with one tick's flow available.
            flow_acc: params.flow_per_tick,
            last_refresh: Tick::ZERO,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    #[inline]
    pub fn params(&self) -> &SegmentParams {
        &self.params
    }

    /// Occupants (running + buffered).
    #[inline]
    pub fn stored(&self) -> u32 {
        self.stored
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn exit_buffer_is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Current flow accumulator value (mainly for tests).
    pub fn flow_accumulator(&self) -> f64 {
        self.flow_acc
    }

    // ── Capacity ──────────────────────────────────────────────────────────

    /// Storage occupancy check; side-effect-free.
    #[inline]
    pub fn has_space(&self) -> bool {
        (self.stored as f64) < self.params.storage_cap
    }

    // ── Time-variant bookkeeping ──────────────────────────────────────────

    /// Apply every scheduled attribute change due at or before `now` and
    /// re-derive the simulation parameters.
    ///
    /// Exit times already assigned to queued vehicles are left untouched —
    /// effects are forward-only.
    pub fn recalc_time_variant_attributes(&mut self, now: Tick, cfg: &EngineConfig) {
        let mut dirty = false;
        while self.next_change < self.changes.len() && self.changes[self.next_change].at <= now {
            match self.changes[self.next_change].value {
                ChangeValue::Freespeed(v) => self.attrs.freespeed_ms = v,
                ChangeValue::FlowCapacity(v) => self.attrs.capacity_veh_h = v,
            }
            self.next_change += 1;
            dirty = true;
        }
        if dirty {
            self.params = SegmentParams::derive(&self.attrs, cfg);
        }
    }

    /// Bring the segment up to date with `now`: apply due attribute changes
    /// and refill the flow accumulator for the elapsed ticks.
    ///
    /// Idempotent within a tick; cheap when nothing changed.
    pub fn refresh(&mut self, now: Tick, cfg: &EngineConfig) {
        self.recalc_time_variant_attributes(now, cfg);
        let elapsed = now.0.saturating_sub(self.last_refresh.0);
        if elapsed > 0 {
            let ceiling = self.params.flow_per_tick.max(1.0);
            self.flow_acc =
                (self.flow_acc + self.params.flow_per_tick * elapsed as f64).min(ceiling);
        }
        self.last_refresh = now;
    }

    // ── Entry ─────────────────────────────────────────────────────────────

    /// Insert `vehicle` at the tail of the running queue.
    ///
    /// Callers must gate on [`has_space`](Self::has_space) (directly or via
    /// the occupancy mirror); enqueueing into a full segment is a contract
    /// violation, not a runtime condition.
    pub fn enqueue(&mut self, mut vehicle: Vehicle, now: Tick) {
        debug_assert!(self.has_space(), "enqueue into full segment {}", self.id);
        vehicle.exit_time = now + self.params.fft_ticks;
        self.stored += 1;
        self.queue.push_back(vehicle);
    }

    /// Move freshly injected ripe vehicles straight into the exit buffer so
    /// a departure with zero remaining free-flow time can cross its first
    /// node in the departure tick.  Consumes flow capacity like any release.
    ///
    /// Vehicles on their final route segment are left in the queue — they
    /// arrive through [`advance`](Self::advance) in the same tick instead.
    pub fn promote_ripe(&mut self, now: Tick) -> Vec<VehicleId> {
        let mut promoted = Vec::new();
        while let Some(head) = self.queue.front() {
            if head.exit_time > now || head.on_final_segment() {
                break;
            }
            if self.flow_acc < 1.0 || self.buffer.len() >= self.params.buffer_cap {
                break;
            }
            let mut v = match self.queue.pop_front() {
                Some(v) => v,
                None => break,
            };
            self.flow_acc -= 1.0;
            v.buffered_at = now;
            promoted.push(v.id);
            self.buffer.push_back(v);
        }
        promoted
    }

    // ── Link phase ────────────────────────────────────────────────────────

    /// Release ripe vehicles from the running queue.
    ///
    /// For every vehicle whose scheduled exit time has come, in strict entry
    /// order: a vehicle on the final segment of its route leaves the network
    /// (an arrival, consuming no flow capacity); any other vehicle moves into
    /// the exit buffer while the accumulator and buffer slots allow.
    pub fn advance(&mut self, now: Tick, cfg: &EngineConfig) -> LinkOutcome {
        self.refresh(now, cfg);
        let mut out = LinkOutcome::default();
        loop {
            let Some(head) = self.queue.front() else { break };
            if head.exit_time > now {
                break;
            }
            if head.on_final_segment() {
                if let Some(v) = self.queue.pop_front() {
                    self.stored -= 1;
                    out.arrivals.push(v);
                }
                continue;
            }
            if self.flow_acc < 1.0 || self.buffer.len() >= self.params.buffer_cap {
                break;
            }
            let mut v = match self.queue.pop_front() {
                Some(v) => v,
                None => break,
            };
            self.flow_acc -= 1.0;
            v.buffered_at = now;
            out.flowed.push(v.id);
            self.buffer.push_back(v);
        }
        out.active = !self.queue.is_empty();
        out
    }

    // ── Node-phase access (destination-node side) ─────────────────────────

    /// The vehicle at the head of the exit buffer, if any.
    #[inline]
    pub fn buffer_head(&self) -> Option<&Vehicle> {
        self.buffer.front()
    }

    /// Remove and return the head of the exit buffer.
    pub fn pop_buffer(&mut self) -> Option<Vehicle> {
        let v = self.buffer.pop_front()?;
        debug_assert!(self.stored > 0, "occupancy underflow on segment {}", self.id);
        self.stored -= 1;
        Some(v)
    }
}

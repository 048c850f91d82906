//! The vehicle cursor — a vehicle's progress through its planned route.
//!
//! A `Vehicle` is the engine's single simulated-entity type.  It carries its
//! own route (an ordered list of segment ids, precomputed by the routing
//! collaborator) and a cursor into it.  The vehicle object is owned by
//! exactly one queue at any time — a segment's running queue, a segment's
//! exit buffer, or a cross-partition transfer in flight — and is moved, never
//! aliased.

use crate::{AgentId, SegmentId, Tick, VehicleId};

/// A vehicle traversing the network along a fixed route.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vehicle {
    /// Vehicle identity, assigned by the demand collaborator.
    pub id: VehicleId,

    /// The agent this trip belongs to.  Opaque to the engine.
    pub agent: AgentId,

    /// Ordered segment ids from trip start to trip end.  Never empty.
    pub route: Box<[SegmentId]>,

    /// Index of the segment the vehicle currently occupies.
    pub cursor: u32,

    /// Earliest tick at which the vehicle may leave its current segment
    /// (entry tick + free-flow travel ticks).  Set on every segment entry.
    pub exit_time: Tick,

    /// Tick at which the vehicle entered its segment's exit buffer.
    /// `Tick::ZERO` until first buffered; only meaningful while buffered.
    /// Drives stuck detection.
    pub buffered_at: Tick,
}

impl Vehicle {
    /// Create a vehicle at the start of `route`.
    ///
    /// The route must be non-empty; the engine validates this when the
    /// departure is scheduled.
    pub fn new(id: VehicleId, agent: AgentId, route: Box<[SegmentId]>) -> Self {
        debug_assert!(!route.is_empty(), "vehicle route must not be empty");
        Self {
            id,
            agent,
            route,
            cursor:      0,
            exit_time:   Tick::ZERO,
            buffered_at: Tick::ZERO,
        }
    }

    /// The segment the vehicle currently occupies.
    #[inline]
    pub fn current_segment(&self) -> SegmentId {
        self.route[self.cursor as usize]
    }

    /// The segment the vehicle will enter next, or `None` on the final
    /// segment of the route.
    #[inline]
    pub fn next_segment(&self) -> Option<SegmentId> {
        self.route.get(self.cursor as usize + 1).copied()
    }

    /// `true` when the current segment is the last of the route.
    #[inline]
    pub fn on_final_segment(&self) -> bool {
        self.cursor as usize + 1 == self.route.len()
    }

    /// Advance the cursor onto the next route segment.
    ///
    /// # Panics
    /// Panics in debug mode when called on the final segment.
    #[inline]
    pub fn advance_route(&mut self) {
        debug_assert!(!self.on_final_segment(), "route already exhausted");
        self.cursor += 1;
    }
}

//! Engine event records.
//!
//! Events are the engine's only observable output stream.  They are
//! append-only and delivered in a canonical order: by tick, then by phase
//! (departures, node phase, link phase), then by producing node/segment id,
//! then by emission order within the producer.  That order equals
//! single-threaded execution order, which is what makes event streams
//! byte-identical across partition counts.

use crate::{AgentId, NodeId, SegmentId, Tick, VehicleId};

/// One simulation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    /// Tick at which the event occurred.
    pub time: Tick,
    /// What happened.
    pub kind: EventKind,
}

/// The event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    /// A vehicle started its trip and was admitted onto its first segment.
    Departed {
        segment: SegmentId,
        vehicle: VehicleId,
    },

    /// A vehicle entered a segment's running queue.
    SegmentEnter {
        segment: SegmentId,
        vehicle: VehicleId,
    },

    /// A vehicle left a segment by crossing its downstream node.
    SegmentLeave {
        segment: SegmentId,
        vehicle: VehicleId,
    },

    /// A vehicle finished its free-flow travel and moved into the segment's
    /// exit buffer, consuming one unit of flow capacity.
    SegmentFlow {
        segment: SegmentId,
        vehicle: VehicleId,
    },

    /// A vehicle reached the end of its route and left the network.
    Arrived {
        segment: SegmentId,
        vehicle: VehicleId,
        agent:   AgentId,
    },

    /// A vehicle exceeded the maximum buffered wait and was forcibly removed.
    Stuck {
        segment: SegmentId,
        node:    NodeId,
        vehicle: VehicleId,
        agent:   AgentId,
    },
}

impl EventKind {
    /// Stable lowercase name, used by output writers.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Departed { .. }     => "departed",
            EventKind::SegmentEnter { .. } => "segment_enter",
            EventKind::SegmentLeave { .. } => "segment_leave",
            EventKind::SegmentFlow { .. }  => "segment_flow",
            EventKind::Arrived { .. }      => "arrived",
            EventKind::Stuck { .. }        => "stuck",
        }
    }

    /// The vehicle the event is about.
    pub fn vehicle(&self) -> VehicleId {
        match *self {
            EventKind::Departed { vehicle, .. }
            | EventKind::SegmentEnter { vehicle, .. }
            | EventKind::SegmentLeave { vehicle, .. }
            | EventKind::SegmentFlow { vehicle, .. }
            | EventKind::Arrived { vehicle, .. }
            | EventKind::Stuck { vehicle, .. } => vehicle,
        }
    }

    /// The segment the event is about.
    pub fn segment(&self) -> SegmentId {
        match *self {
            EventKind::Departed { segment, .. }
            | EventKind::SegmentEnter { segment, .. }
            | EventKind::SegmentLeave { segment, .. }
            | EventKind::SegmentFlow { segment, .. }
            | EventKind::Arrived { segment, .. }
            | EventKind::Stuck { segment, .. } => segment,
        }
    }
}

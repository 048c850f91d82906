//! Time-variant attribute changes.
//!
//! Scheduled changes to a segment's free-flow speed or flow capacity
//! (road works, temporary closures, peak-hour metering).  Changes are
//! registered on the [`NetworkBuilder`](crate::NetworkBuilder), sorted per
//! segment at build time, and applied by the owning worker when the segment
//! is next touched at or after the change tick.  A change never retouches
//! exit times that were already assigned — effects are forward-only.

use flow_core::Tick;

/// The attribute a change replaces.
///
/// Storage capacity is deliberately not time-variant: it is mirrored across
/// partitions and must stay constant within a run.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChangeValue {
    /// New free-flow speed in m/s.  Must be positive.
    Freespeed(f64),
    /// New flow capacity in vehicles/hour.  Must be non-negative.
    FlowCapacity(f64),
}

/// One scheduled attribute change.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeChange {
    /// First tick at which the new value is in effect.
    pub at: Tick,
    pub value: ChangeValue,
}

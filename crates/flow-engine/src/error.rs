//! Engine error type.

use thiserror::Error;

use flow_core::{FlowError, NodeId, SegmentId, Tick, VehicleId};
use flow_net::NetError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] FlowError),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error("vehicle {vehicle}: route references unknown segment {segment}")]
    UnknownSegment {
        vehicle: VehicleId,
        segment: SegmentId,
    },

    #[error("vehicle {vehicle}: {what}")]
    BadRoute { vehicle: VehicleId, what: String },

    #[error("vehicle {vehicle}: departure at {depart} is before the next tick {now}")]
    DepartureInPast {
        vehicle: VehicleId,
        depart: Tick,
        now: Tick,
    },

    #[error("signal plan references invalid approach: node {node}, segment {segment}")]
    SignalReference { node: NodeId, segment: SegmentId },

    /// A worker thread failed mid-tick.  Partial-tick state cannot be
    /// trusted, so the run is over; every later call returns this again.
    #[error("worker thread failed: {0}")]
    RunnerFailed(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

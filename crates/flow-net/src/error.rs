//! Network construction and validation errors.

use thiserror::Error;

use flow_core::{FlowError, NodeId, SegmentId};

#[derive(Debug, Error)]
pub enum NetError {
    #[error("segment {segment} references node {node}, which does not exist")]
    MissingEndpoint { segment: SegmentId, node: NodeId },

    #[error("segment {segment}: free-flow speed must be positive, got {value}")]
    BadFreespeed { segment: SegmentId, value: f64 },

    #[error("segment {segment}: lane count must be positive, got {value}")]
    BadLanes { segment: SegmentId, value: f64 },

    #[error("segment {segment}: negative length {value}")]
    BadLength { segment: SegmentId, value: f64 },

    #[error("segment {segment}: negative flow capacity {value}")]
    BadCapacity { segment: SegmentId, value: f64 },

    #[error("change event references unknown segment {0}")]
    ChangeUnknownSegment(SegmentId),

    #[error("change event for segment {segment}: {what}")]
    BadChange { segment: SegmentId, what: String },

    #[error(transparent)]
    Core(#[from] FlowError),
}

pub type NetResult<T> = Result<T, NetError>;

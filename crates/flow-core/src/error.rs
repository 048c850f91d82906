//! Base error type.
//!
//! Sub-crates define their own error enums and either convert `FlowError`
//! via `From` or wrap it as one variant.  Both patterns are acceptable;
//! prefer whichever keeps error sites clean.

use thiserror::Error;

use crate::{NodeId, SegmentId};

/// The base error type for `flow-core` and a common base for sub-crates.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("segment {0} not found")]
    SegmentNotFound(SegmentId),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Shorthand result type for all `flow-*` crates.
pub type FlowResult<T> = Result<T, FlowError>;

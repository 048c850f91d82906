//! `flow-net` — network container, queue segments, and intersection nodes.
//!
//! # What lives here
//!
//! | Module         | Contents                                              |
//! |----------------|-------------------------------------------------------|
//! | [`network`]    | `Network` (immutable CSR arena), `NetworkBuilder`, `SegmentAttrs`, `SegmentParams` |
//! | [`segment`]    | `SimSegment` — running queue, exit buffer, capacities |
//! | [`node`]       | `SimNode`, `NodeScratch`, `SegmentEntry`              |
//! | [`occupancy`]  | `OccupancyMirror` — cross-partition space checks      |
//! | [`activation`] | `ActivationLedger` — container activation bookkeeping |
//! | [`overlay`]    | `AttributeChange`, `ChangeValue` — time-variant data  |
//! | [`error`]      | `NetError`, `NetResult`                               |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                              |
//! |---------|-----------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to data-carrier types. |

pub mod activation;
pub mod error;
pub mod network;
pub mod node;
pub mod occupancy;
pub mod overlay;
pub mod segment;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use activation::ActivationLedger;
pub use error::{NetError, NetResult};
pub use network::{Network, NetworkBuilder, SegmentAttrs, SegmentParams, EFFECTIVE_CELL_SIZE_M};
pub use node::{NodeScratch, SegmentEntry, SimNode};
pub use occupancy::OccupancyMirror;
pub use overlay::{AttributeChange, ChangeValue};
pub use segment::{LinkOutcome, SimSegment};

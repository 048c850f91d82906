//! `flow-core` — foundational types for the flowsim traffic engine.
//!
//! This crate is a dependency of every other `flow-*` crate.  It
//! intentionally has no `flow-*` dependencies and minimal external ones
//! (only `rand` and `thiserror`, plus optional `serde`).
//!
//! # What lives here
//!
//! | Module      | Contents                                             |
//! |-------------|------------------------------------------------------|
//! | [`ids`]     | `NodeId`, `SegmentId`, `VehicleId`, `AgentId`        |
//! | [`time`]    | `Tick`, `EngineConfig`                               |
//! | [`rng`]     | `NodeRng` (per-node deterministic RNG)               |
//! | [`vehicle`] | `Vehicle` — the route cursor / simulated entity      |
//! | [`events`]  | `Event`, `EventKind`                                 |
//! | [`error`]   | `FlowError`, `FlowResult`                            |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                              |
//! |---------|-----------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types. |

pub mod error;
pub mod events;
pub mod ids;
pub mod rng;
pub mod time;
pub mod vehicle;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{FlowError, FlowResult};
pub use events::{Event, EventKind};
pub use ids::{AgentId, NodeId, SegmentId, VehicleId};
pub use rng::NodeRng;
pub use time::{EngineConfig, Tick};
pub use vehicle::Vehicle;

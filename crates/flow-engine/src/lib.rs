//! `flow-engine` — the parallel tick loop of the flowsim traffic engine.
//!
//! # Tick protocol
//!
//! ```text
//! step(sink):
//!   between ticks   — signal sim_step + snapshot; departure admission
//!                     against the occupancy mirror; publish tick
//!   ── start barrier (workers + coordinator) ──────────────────────────
//!   inject phase    — each worker applies admitted departures
//!   node phase      — each worker advances its nodes; crossings leave
//!                     as entries bound for the owning partition
//!   ── separation barrier (workers; leader folds activation ledger) ───
//!   entry apply     — each worker enqueues entries into its segments
//!   link phase      — each worker advances its active segments
//!   ── end barrier (workers + coordinator) ────────────────────────────
//!   drain           — coordinator merges events into canonical order,
//!                     updates the mirror, reports the tick outcome
//! ```
//!
//! Within one tick all node advances complete, and are visible, before any
//! segment advance begins; across ticks, tick N's full effects (including
//! mirror updates) land before tick N+1 starts.  Node and link processing
//! is lock-free — ownership, not locking, prevents cross-worker access; the
//! exchange mutex exists only inside the barrier windows.
//!
//! Determinism: one seed → byte-identical event streams for any partition
//! count.  Node tie-breaks come from per-node RNGs, cross-partition space
//! checks read the tick-frozen mirror, and the event merge reconstructs
//! single-threaded execution order.
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use flow_core::{AgentId, EngineConfig, Tick, VehicleId};
//! use flow_engine::{EngineBuilder, NoopSink};
//!
//! let mut engine = EngineBuilder::new(network, EngineConfig::default()).build()?;
//! engine.schedule_departure(VehicleId(0), AgentId(0), route, Tick(0))?;
//! let outcome = engine.step(&mut NoopSink)?;
//! engine.shutdown()?;
//! ```

pub mod builder;
pub mod engine;
pub mod error;
pub mod sink;

mod departures;
mod exchange;
mod partition;
mod runner;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use builder::EngineBuilder;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use sink::{EventSink, NoopSink, StuckRemoval, TickOutcome, TripEnd};

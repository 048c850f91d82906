//! Simulation time model and engine configuration.
//!
//! # Design
//!
//! Time is a monotonically increasing `Tick` counter.  One tick represents
//! `EngineConfig::tick_secs` simulated seconds (default 1.0).  Using an
//! integer tick as the canonical time unit means all queue arithmetic is
//! exact (no floating-point drift) and comparisons are O(1); seconds only
//! appear at the configuration boundary and in derived capacities.

use std::fmt;

use crate::{FlowError, FlowResult};

// ── Tick ─────────────────────────────────────────────────────────────────────

/// An absolute simulation tick counter.
///
/// Stored as `u64`: at 1 s per tick a u64 lasts ~585 billion years, so
/// overflow is not a practical concern for any run length.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    /// Return the tick `n` steps after `self`.
    #[inline]
    pub fn offset(self, n: u64) -> Tick {
        Tick(self.0 + n)
    }

    /// Ticks elapsed from `earlier` to `self`.
    ///
    /// # Panics
    /// Panics in debug mode if `earlier > self`.
    #[inline]
    pub fn since(self, earlier: Tick) -> u64 {
        self.0 - earlier.0
    }
}

impl std::ops::Add<u64> for Tick {
    type Output = Tick;
    #[inline]
    fn add(self, rhs: u64) -> Tick {
        Tick(self.0 + rhs)
    }
}

impl std::ops::Sub for Tick {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: Tick) -> u64 {
        self.0 - rhs.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// ── EngineConfig ──────────────────────────────────────────────────────────────

/// Engine configuration, read once when the engine is prepared.
///
/// Typically loaded from a TOML/JSON file by the application crate and passed
/// to the engine builder.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Simulated seconds per tick.  Default: 1.0.
    pub tick_secs: f64,

    /// Number of worker partitions (threads).  Must be ≥ 1.
    pub partitions: usize,

    /// Scale factor applied to every segment's storage capacity.  Used to
    /// down-scale networks when simulating a population sample.
    pub storage_scale: f64,

    /// Scale factor applied to every segment's flow capacity.
    pub flow_scale: f64,

    /// Maximum time (simulated seconds) a vehicle may wait in an exit buffer
    /// before it is forcibly removed as stuck.  `f64::INFINITY` disables
    /// stuck removal entirely.  Default: 3600.0.
    pub max_buffered_wait_secs: f64,

    /// Keep every segment on its runner's processing list for the whole run
    /// instead of activating segments lazily on first use.
    pub eager_segments: bool,

    /// Process every node each tick instead of only nodes with buffered
    /// vehicles on an approach.
    pub eager_nodes: bool,

    /// Master RNG seed.  The same seed always produces identical results,
    /// regardless of the partition count.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_secs:              1.0,
            partitions:             1,
            storage_scale:          1.0,
            flow_scale:             1.0,
            max_buffered_wait_secs: 3600.0,
            eager_segments:         false,
            eager_nodes:            false,
            seed:                   0,
        }
    }
}

impl EngineConfig {
    /// Simulated wall time (seconds) corresponding to `tick`.
    #[inline]
    pub fn time_secs(&self, tick: Tick) -> f64 {
        tick.0 as f64 * self.tick_secs
    }

    /// How many ticks span `secs` seconds? (rounds up)
    #[inline]
    pub fn ticks_for_secs(&self, secs: f64) -> u64 {
        (secs / self.tick_secs).ceil() as u64
    }

    /// Stuck threshold in whole ticks, or `None` when disabled.
    pub fn max_wait_ticks(&self) -> Option<u64> {
        if self.max_buffered_wait_secs.is_finite() {
            Some(self.ticks_for_secs(self.max_buffered_wait_secs))
        } else {
            None
        }
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> FlowResult<()> {
        if !(self.tick_secs > 0.0) {
            return Err(FlowError::Config(format!(
                "tick_secs must be positive, got {}",
                self.tick_secs
            )));
        }
        if self.partitions == 0 {
            return Err(FlowError::Config("partitions must be >= 1".into()));
        }
        if !(self.storage_scale > 0.0) || !(self.flow_scale > 0.0) {
            return Err(FlowError::Config(format!(
                "capacity scale factors must be positive, got storage={} flow={}",
                self.storage_scale, self.flow_scale
            )));
        }
        if self.max_buffered_wait_secs < 0.0 {
            return Err(FlowError::Config(
                "max_buffered_wait_secs must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

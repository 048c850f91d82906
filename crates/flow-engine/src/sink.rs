//! Event sink trait and per-tick outcome reporting.

use flow_core::{AgentId, Event, NodeId, SegmentId, Tick, VehicleId};

// ── Notifications ─────────────────────────────────────────────────────────────

/// A trip that finished this tick: its vehicle reached the end of its route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripEnd {
    pub vehicle: VehicleId,
    pub agent: AgentId,
    /// The final segment of the route.
    pub segment: SegmentId,
}

/// A vehicle forcibly removed after exceeding the maximum buffered wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckRemoval {
    pub vehicle: VehicleId,
    pub agent: AgentId,
    /// The segment whose exit buffer held the vehicle.
    pub segment: SegmentId,
    /// The node that removed it.
    pub node: NodeId,
}

/// Aggregate result of one engine tick, for the demand collaborator and for
/// progress reporting.  `arrived` and `stuck` are sorted by vehicle id.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub tick: Tick,
    pub arrived: Vec<TripEnd>,
    pub stuck: Vec<StuckRemoval>,
    /// Events emitted this tick (all kinds).
    pub events: usize,
    /// Segments on some worker's processing list after this tick.
    pub active_segments: usize,
    /// Segments that became active during this tick.
    pub newly_activated: usize,
}

// ── EventSink ─────────────────────────────────────────────────────────────────

/// Callbacks invoked by [`Engine::step`][crate::Engine::step] after each
/// completed tick.
///
/// All methods have default no-op implementations so implementors only need
/// to override what they care about.  Events arrive in canonical order —
/// identical for every partition count.
///
/// # Example — event counter
///
/// ```rust,ignore
/// struct Counter(usize);
///
/// impl EventSink for Counter {
///     fn on_events(&mut self, _tick: Tick, events: &[Event]) {
///         self.0 += events.len();
///     }
/// }
/// ```
pub trait EventSink {
    /// Called once per tick with every event the tick produced.
    fn on_events(&mut self, _tick: Tick, _events: &[Event]) {}

    /// Called once per tick after `on_events`.
    fn on_tick_end(&mut self, _outcome: &TickOutcome) {}
}

/// An [`EventSink`] that does nothing.  Use when you need to call `step` but
/// don't want callbacks.
pub struct NoopSink;

impl EventSink for NoopSink {}

//! The engine coordinator.
//!
//! `Engine` drives the tick protocol from the caller's thread: publish the
//! tick, release the start barrier, block on the end barrier, drain the
//! exchange.  One `step()` call is one fully completed tick across every
//! partition — the caller never observes a half-advanced network.
//!
//! # Lifecycle
//!
//! [`EngineBuilder`](crate::EngineBuilder) is the unprepared state;
//! `build()` spawns the worker threads (prepared, parked at the start
//! barrier); `step()` runs ticks; [`shutdown`](Engine::shutdown) consumes
//! the engine, releases the workers into their stop check, and joins them.
//! Ownership makes illegal transitions unrepresentable: a finished engine is
//! a moved-out engine.  Dropping an engine without calling `shutdown` joins
//! the workers too.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use flow_core::{
    AgentId, EngineConfig, Event, FlowError, SegmentId, Tick, Vehicle, VehicleId,
};
use flow_net::{Network, OccupancyMirror};
use flow_signals::{SignalControl, SignalTable};

use crate::departures::DepartureQueue;
use crate::exchange::{KeyedEvent, Shared};
use crate::{EngineError, EngineResult, EventSink, StuckRemoval, TickOutcome, TripEnd};

/// The parallel engine coordinator.  Create via
/// [`EngineBuilder`](crate::EngineBuilder).
pub struct Engine {
    pub(crate) shared: Arc<Shared>,
    pub(crate) handles: Vec<JoinHandle<()>>,
    pub(crate) net: Arc<Network>,
    pub(crate) cfg: Arc<EngineConfig>,
    pub(crate) mirror: OccupancyMirror,
    pub(crate) signal_table: Arc<SignalTable>,
    pub(crate) controller: Box<dyn SignalControl>,
    pub(crate) departures: DepartureQueue,
    pub(crate) next_tick: Tick,
    pub(crate) failed: Option<String>,
    pub(crate) joined: bool,
}

impl Engine {
    // ── Introspection ─────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn network(&self) -> &Network {
        &self.net
    }

    /// The tick the next `step()` call will simulate.
    pub fn next_tick(&self) -> Tick {
        self.next_tick
    }

    /// Occupants of `segment` as of the last tick boundary.
    pub fn occupancy(&self, segment: SegmentId) -> u32 {
        self.mirror.occupancy(segment)
    }

    /// Storage capacity of `segment` in vehicles.
    pub fn storage_cap(&self, segment: SegmentId) -> f64 {
        self.mirror.cap(segment)
    }

    /// Trips scheduled or waiting to depart.
    pub fn pending_departures(&self) -> usize {
        self.departures.pending()
    }

    // ── Demand interface ──────────────────────────────────────────────────

    /// Register a trip: `vehicle` (owned by `agent`) will traverse `route`,
    /// departing no earlier than `depart`.
    ///
    /// The route is validated eagerly — an unknown segment, a disconnected
    /// consecutive pair, an empty route, or a departure tick already in the
    /// past is an error before the trip ever enters the simulation.
    pub fn schedule_departure(
        &mut self,
        vehicle: VehicleId,
        agent: AgentId,
        route: Vec<SegmentId>,
        depart: Tick,
    ) -> EngineResult<()> {
        self.net.validate_route(&route).map_err(|e| match e {
            FlowError::SegmentNotFound(segment) => EngineError::UnknownSegment { vehicle, segment },
            FlowError::Config(what) => EngineError::BadRoute { vehicle, what },
            other => EngineError::Core(other),
        })?;
        if depart < self.next_tick {
            return Err(EngineError::DepartureInPast {
                vehicle,
                depart,
                now: self.next_tick,
            });
        }
        self.departures
            .schedule(depart, Vehicle::new(vehicle, agent, route.into_boxed_slice()));
        Ok(())
    }

    // ── Tick loop ─────────────────────────────────────────────────────────

    /// Run one tick to completion across all partitions.
    ///
    /// Synchronous: when this returns, every node and segment advance of the
    /// tick has happened, events have been delivered to `sink` in canonical
    /// order, and the occupancy mirror is at the new boundary state.
    pub fn step<S: EventSink>(&mut self, sink: &mut S) -> EngineResult<TickOutcome> {
        if let Some(message) = &self.failed {
            return Err(EngineError::RunnerFailed(message.clone()));
        }
        let now = self.next_tick;

        // Signal update precedes the node phase so state is current for the
        // whole tick.
        self.controller.sim_step(now);
        self.signal_table.refresh(&*self.controller, now);

        // Admit due departures against the mirror and fill inject mailboxes.
        {
            let mut ex = self.shared.lock_exchange();
            self.departures
                .admit(now, &self.net, &self.mirror, self.handles.len(), &mut ex.inject);
        }

        self.shared.tick.store(now.0, Ordering::Relaxed);
        self.shared.start.wait();
        self.shared.end.wait();

        if let Some(message) = self.shared.take_error() {
            self.failed = Some(message.clone());
            return Err(EngineError::RunnerFailed(message));
        }

        // Drain the exchange and merge per-partition results.
        let mut keyed: Vec<KeyedEvent> = Vec::new();
        let mut arrived: Vec<TripEnd> = Vec::new();
        let mut stuck: Vec<StuckRemoval> = Vec::new();
        let (active_segments, newly_activated) = {
            let mut ex = self.shared.lock_exchange();
            for p in 0..self.handles.len() {
                keyed.append(&mut ex.events[p]);
                for (segment, occupants) in ex.occupancy[p].drain(..) {
                    self.mirror.set(segment, occupants);
                }
                arrived.append(&mut ex.arrived[p]);
                stuck.append(&mut ex.stuck[p]);
            }
            let newly = ex.ledger.collect_newly_activated().len();
            (ex.ledger.active_count(), newly)
        };

        // Canonical order: the single-threaded execution order, whatever the
        // partition count was.
        keyed.sort_unstable_by_key(|k| (k.phase, k.producer, k.seq));
        let events: Vec<Event> = keyed.into_iter().map(|k| k.event).collect();
        arrived.sort_unstable_by_key(|t| t.vehicle);
        stuck.sort_unstable_by_key(|s| s.vehicle);

        sink.on_events(now, &events);
        let outcome = TickOutcome {
            tick: now,
            events: events.len(),
            arrived,
            stuck,
            active_segments,
            newly_activated,
        };
        sink.on_tick_end(&outcome);

        self.next_tick = now + 1;
        Ok(outcome)
    }

    /// Run exactly `n` ticks.  Stops early on the first failed tick.
    pub fn run_ticks<S: EventSink>(&mut self, n: u64, sink: &mut S) -> EngineResult<()> {
        for _ in 0..n {
            self.step(sink)?;
        }
        Ok(())
    }

    // ── Teardown ──────────────────────────────────────────────────────────

    /// Stop all workers and join their threads.
    ///
    /// Consumes the engine: after shutdown there is nothing left to step.
    pub fn shutdown(mut self) -> EngineResult<()> {
        self.join_workers();
        match self.failed.take() {
            None => Ok(()),
            Some(message) => Err(EngineError::RunnerFailed(message)),
        }
    }

    fn join_workers(&mut self) {
        if self.joined {
            return;
        }
        self.joined = true;
        self.shared.stop.store(true, Ordering::Relaxed);
        // Runners are parked at the start barrier between ticks; one more
        // release lets them observe the stop flag and return.
        self.shared.start.wait();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() && self.failed.is_none() {
                self.failed = Some("worker panicked during shutdown".to_string());
            }
        }
        log::info!("engine stopped at {}", self.next_tick);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.join_workers();
    }
}

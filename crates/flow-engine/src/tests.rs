//! Integration tests for flow-engine.

use flow_core::{
    AgentId, EngineConfig, Event, EventKind, NodeId, SegmentId, Tick, VehicleId,
};
use flow_net::{Network, NetworkBuilder};
use flow_signals::{ApproachPlan, FixedTimeControl};

use crate::{Engine, EngineBuilder, EngineError, EventSink, NoopSink, TickOutcome};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn cfg(partitions: usize) -> EngineConfig {
    EngineConfig {
        partitions,
        seed: 42,
        ..Default::default()
    }
}

/// Sink that flattens every tick's events into one stream.
#[derive(Default)]
struct Collect {
    events: Vec<Event>,
    outcomes: Vec<TickOutcome>,
}

impl EventSink for Collect {
    fn on_events(&mut self, _tick: Tick, events: &[Event]) {
        self.events.extend_from_slice(events);
    }
    fn on_tick_end(&mut self, outcome: &TickOutcome) {
        self.outcomes.push(outcome.clone());
    }
}

fn leaves_of(events: &[Event], segment: SegmentId) -> Vec<(Tick, VehicleId)> {
    events
        .iter()
        .filter_map(|e| match e.kind {
            EventKind::SegmentLeave { segment: s, vehicle } if s == segment => {
                Some((e.time, vehicle))
            }
            _ => None,
        })
        .collect()
}

fn arrivals_of(events: &[Event]) -> Vec<(Tick, VehicleId)> {
    events
        .iter()
        .filter_map(|e| match e.kind {
            EventKind::Arrived { vehicle, .. } => Some((e.time, vehicle)),
            _ => None,
        })
        .collect()
}

/// u → n → w chain of two zero-length segments (free-flow time 0, flow
/// 1 veh/tick, storage 1 vehicle each).
fn tight_chain() -> (Network, SegmentId, SegmentId) {
    let mut b = NetworkBuilder::new();
    let u = b.add_node();
    let n = b.add_node();
    let w = b.add_node();
    let a = b.add_segment(u, n, 0.0, 10.0, 3600.0, 1.0);
    let s = b.add_segment(n, w, 0.0, 10.0, 3600.0, 1.0);
    (b.build().unwrap(), a, s)
}

// ── The 3-vehicle / 2-segment / 1-node scenario ───────────────────────────────

#[cfg(test)]
mod chain_scenario {
    use super::*;

    /// Three vehicles injected at t=0 leave the first segment at t = 0, 1, 2
    /// (one per tick) and reach the end of the second in injection order.
    #[test]
    fn releases_one_per_tick_in_injection_order() {
        let (net, a, s) = tight_chain();
        let mut engine = EngineBuilder::new(net, cfg(2)).build().unwrap();
        for v in 1..=3u32 {
            engine
                .schedule_departure(VehicleId(v), AgentId(v), vec![a, s], Tick(0))
                .unwrap();
        }

        let mut sink = Collect::default();
        engine.run_ticks(6, &mut sink).unwrap();

        assert_eq!(
            leaves_of(&sink.events, a),
            vec![
                (Tick(0), VehicleId(1)),
                (Tick(1), VehicleId(2)),
                (Tick(2), VehicleId(3)),
            ]
        );
        assert_eq!(
            arrivals_of(&sink.events),
            vec![
                (Tick(0), VehicleId(1)),
                (Tick(1), VehicleId(2)),
                (Tick(2), VehicleId(3)),
            ]
        );

        // Per-tick arrival notifications matched the events.
        assert_eq!(sink.outcomes[0].arrived.len(), 1);
        assert_eq!(sink.outcomes[0].arrived[0].vehicle, VehicleId(1));
        assert_eq!(sink.outcomes[0].arrived[0].segment, s);

        // Everything drained: no pending departures, empty network.
        assert_eq!(engine.pending_departures(), 0);
        assert_eq!(engine.occupancy(a), 0);
        assert_eq!(engine.occupancy(s), 0);
        assert_eq!(sink.outcomes.last().unwrap().active_segments, 0);

        engine.shutdown().unwrap();
    }

    /// One tick produces the canonical event order: departure bookkeeping,
    /// then node-phase movements, then link-phase arrivals.
    #[test]
    fn canonical_event_order_within_a_tick() {
        let (net, a, s) = tight_chain();
        let mut engine = EngineBuilder::new(net, cfg(1)).build().unwrap();
        engine
            .schedule_departure(VehicleId(7), AgentId(7), vec![a, s], Tick(0))
            .unwrap();

        let mut sink = Collect::default();
        engine.step(&mut sink).unwrap();

        let kinds: Vec<&'static str> = sink.events.iter().map(|e| e.kind.name()).collect();
        assert_eq!(
            kinds,
            vec![
                "departed",
                "segment_enter",
                "segment_flow",
                "segment_leave",
                "segment_enter",
                "arrived",
            ]
        );
        engine.shutdown().unwrap();
    }
}

// ── Determinism across partition counts ───────────────────────────────────────

#[cfg(test)]
mod determinism {
    use super::*;

    /// 12-node ring with one segment per direction between neighbours.
    /// Clockwise segment from node i has id i; counter-clockwise from node i
    /// has id 12 + i.  Every node has two approaches, so the per-node RNG
    /// tie-break is exercised at every merge.
    fn ring() -> Network {
        const N: u32 = 12;
        let mut b = NetworkBuilder::new();
        let nodes: Vec<NodeId> = (0..N).map(|_| b.add_node()).collect();
        for i in 0..N {
            let next = ((i + 1) % N) as usize;
            b.add_segment(nodes[i as usize], nodes[next], 15.0, 15.0, 3600.0, 1.0);
        }
        for i in 0..N {
            let prev = ((i + N - 1) % N) as usize;
            b.add_segment(nodes[i as usize], nodes[prev], 15.0, 15.0, 3600.0, 1.0);
        }
        b.build().unwrap()
    }

    fn ring_run(partitions: usize, eager: bool, ticks: u64) -> (Vec<Event>, Vec<TickOutcome>) {
        const N: u32 = 12;
        let net = ring();
        let config = EngineConfig {
            eager_segments: eager,
            eager_nodes: eager,
            ..cfg(partitions)
        };
        let mut engine = EngineBuilder::new(net, config).build().unwrap();

        // 8 clockwise trips of 6 segments, staggered departures.
        for k in 0..8u32 {
            let route: Vec<SegmentId> = (0..6).map(|j| SegmentId((k + j) % N)).collect();
            engine
                .schedule_departure(VehicleId(k), AgentId(k), route, Tick((k % 3) as u64))
                .unwrap();
        }
        // 8 counter-clockwise trips of 5 segments.
        for k in 0..8u32 {
            let route: Vec<SegmentId> = (0..5).map(|j| SegmentId(N + (k + N - j) % N)).collect();
            engine
                .schedule_departure(
                    VehicleId(100 + k),
                    AgentId(100 + k),
                    route,
                    Tick((k % 4) as u64),
                )
                .unwrap();
        }

        let mut sink = Collect::default();
        for _ in 0..ticks {
            let outcome = engine.step(&mut sink).unwrap();
            // Storage invariant at every boundary: occupants never exceed
            // the (integer-rounded) storage capacity.
            for s in 0..engine.network().segment_count() {
                let seg = SegmentId(s as u32);
                assert!(
                    (engine.occupancy(seg) as f64) <= engine.storage_cap(seg).ceil(),
                    "storage invariant violated on {seg} at {}",
                    outcome.tick
                );
            }
        }
        engine.shutdown().unwrap();
        (sink.events, sink.outcomes)
    }

    #[test]
    fn event_stream_is_identical_for_1_2_and_8_partitions() {
        let (e1, _) = ring_run(1, false, 40);
        let (e2, _) = ring_run(2, false, 40);
        let (e8, _) = ring_run(8, false, 40);
        assert!(!e1.is_empty());
        assert_eq!(e1, e2);
        assert_eq!(e1, e8);
    }

    #[test]
    fn eager_mode_is_deterministic_too() {
        let (e1, _) = ring_run(1, true, 40);
        let (e4, _) = ring_run(4, true, 40);
        assert_eq!(e1, e4);
    }

    #[test]
    fn all_trips_complete() {
        let (events, _) = ring_run(2, false, 80);
        let arrived = arrivals_of(&events);
        assert_eq!(arrived.len(), 16, "every trip must finish: {arrived:?}");
    }
}

// ── Signals ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod signals {
    use super::*;

    /// A vehicle held at a red signal for ticks 0–9 crosses exactly once, at
    /// the first Go tick.
    #[test]
    fn stop_holds_vehicle_until_first_go_tick() {
        let mut b = NetworkBuilder::new();
        let u = b.add_node();
        let n = b.add_signalized_node();
        let w = b.add_node();
        let a = b.add_segment(u, n, 0.0, 10.0, 3600.0, 1.0);
        let s = b.add_segment(n, w, 0.0, 10.0, 3600.0, 1.0);
        let net = b.build().unwrap();

        let control = FixedTimeControl::new().with_plan(n, a, ApproachPlan {
            cycle_ticks:  20,
            green_from:   10,
            green_until:  20,
            offset_ticks: 0,
        });
        let mut engine = EngineBuilder::new(net, cfg(2))
            .signals(Box::new(control))
            .build()
            .unwrap();
        engine
            .schedule_departure(VehicleId(1), AgentId(1), vec![a, s], Tick(0))
            .unwrap();

        let mut sink = Collect::default();
        engine.run_ticks(12, &mut sink).unwrap();

        assert_eq!(leaves_of(&sink.events, a), vec![(Tick(10), VehicleId(1))]);
        assert_eq!(arrivals_of(&sink.events), vec![(Tick(10), VehicleId(1))]);
        engine.shutdown().unwrap();
    }

    #[test]
    fn plan_for_invalid_approach_is_rejected_at_build() {
        let mut b = NetworkBuilder::new();
        let u = b.add_node();
        let n = b.add_signalized_node();
        let _a = b.add_segment(u, n, 0.0, 10.0, 3600.0, 1.0);
        let out = b.add_segment(n, u, 0.0, 10.0, 3600.0, 1.0);
        let net = b.build().unwrap();

        // `out` leaves n — it is not an approach of n.
        let plan = ApproachPlan { cycle_ticks: 2, green_from: 0, green_until: 1, offset_ticks: 0 };
        let control = FixedTimeControl::new().with_plan(n, out, plan);
        let err = EngineBuilder::new(net, cfg(1))
            .signals(Box::new(control))
            .build()
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, EngineError::SignalReference { .. }));

        // A plan on an unsignalized node is rejected too.
        let mut b = NetworkBuilder::new();
        let u = b.add_node();
        let n = b.add_node();
        let a2 = b.add_segment(u, n, 0.0, 10.0, 3600.0, 1.0);
        let net = b.build().unwrap();
        let control = FixedTimeControl::new().with_plan(n, a2, plan);
        let err = EngineBuilder::new(net, cfg(1))
            .signals(Box::new(control))
            .build()
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, EngineError::SignalReference { .. }));
    }
}

// ── Stuck removal ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod stuck {
    use super::*;

    /// A vehicle blocked at a full downstream segment past the wait
    /// threshold is removed exactly once and frees its storage.
    #[test]
    fn blocked_vehicle_is_removed_exactly_once() {
        let mut b = NetworkBuilder::new();
        let u = b.add_node();
        let n = b.add_node();
        let w = b.add_node();
        let a = b.add_segment(u, n, 0.0, 10.0, 3600.0, 1.0);
        // 5 m at 0.005 m/s → 1000-tick traversal, storage 1: a long-lived plug.
        let s = b.add_segment(n, w, 5.0, 0.005, 3600.0, 1.0);
        let net = b.build().unwrap();

        let config = EngineConfig {
            max_buffered_wait_secs: 5.0,
            ..cfg(2)
        };
        let mut engine = EngineBuilder::new(net, config).build().unwrap();
        // v0 plugs the downstream segment for 1000 ticks.
        engine
            .schedule_departure(VehicleId(0), AgentId(0), vec![s], Tick(0))
            .unwrap();
        // v1 wants to follow and will wait at the node.
        engine
            .schedule_departure(VehicleId(1), AgentId(1), vec![a, s], Tick(0))
            .unwrap();

        let mut sink = Collect::default();
        engine.run_ticks(10, &mut sink).unwrap();

        let stuck: Vec<(Tick, VehicleId)> = sink
            .events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::Stuck { vehicle, .. } => Some((e.time, vehicle)),
                _ => None,
            })
            .collect();
        // Buffered at t=0 with a 5-tick limit → removed at t=6, only once.
        assert_eq!(stuck, vec![(Tick(6), VehicleId(1))]);

        let tick6 = &sink.outcomes[6];
        assert_eq!(tick6.stuck.len(), 1);
        assert_eq!(tick6.stuck[0].vehicle, VehicleId(1));
        assert_eq!(tick6.stuck[0].segment, a);
        assert_eq!(tick6.stuck[0].node, n);

        // The removed vehicle no longer occupies the network.
        assert_eq!(engine.occupancy(a), 0);
        assert!(leaves_of(&sink.events, a).is_empty(), "never crossed");
        engine.shutdown().unwrap();
    }

    #[test]
    fn infinite_threshold_never_removes() {
        let mut b = NetworkBuilder::new();
        let u = b.add_node();
        let n = b.add_node();
        let w = b.add_node();
        let a = b.add_segment(u, n, 0.0, 10.0, 3600.0, 1.0);
        let s = b.add_segment(n, w, 5.0, 0.005, 3600.0, 1.0);
        let net = b.build().unwrap();

        let config = EngineConfig {
            max_buffered_wait_secs: f64::INFINITY,
            ..cfg(1)
        };
        let mut engine = EngineBuilder::new(net, config).build().unwrap();
        engine
            .schedule_departure(VehicleId(0), AgentId(0), vec![s], Tick(0))
            .unwrap();
        engine
            .schedule_departure(VehicleId(1), AgentId(1), vec![a, s], Tick(0))
            .unwrap();

        let mut sink = Collect::default();
        engine.run_ticks(50, &mut sink).unwrap();
        assert!(sink.outcomes.iter().all(|o| o.stuck.is_empty()));
        engine.shutdown().unwrap();
    }
}

// ── Spillback ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod spillback {
    use super::*;

    /// A blocked head keeps every vehicle behind it on the same approach
    /// from advancing — even vehicles whose own target has space — until the
    /// head clears; then the approach drains in order.
    #[test]
    fn blocked_head_blocks_the_whole_approach() {
        let mut b = NetworkBuilder::new();
        let u = b.add_node();
        let n = b.add_node();
        let w1 = b.add_node();
        let w2 = b.add_node();
        // 15 m at 15 m/s → 1-tick travel, storage 2, flow 2/tick.
        let a = b.add_segment(u, n, 15.0, 15.0, 7200.0, 1.0);
        // 5 m at 1 m/s → 5-tick travel, storage 1: occupied until t=5.
        let full = b.add_segment(n, w1, 5.0, 1.0, 3600.0, 1.0);
        let free = b.add_segment(n, w2, 15.0, 15.0, 3600.0, 1.0);
        let net = b.build().unwrap();

        let mut engine = EngineBuilder::new(net, cfg(2)).build().unwrap();
        engine
            .schedule_departure(VehicleId(0), AgentId(0), vec![full], Tick(0))
            .unwrap();
        engine
            .schedule_departure(VehicleId(1), AgentId(1), vec![a, full], Tick(0))
            .unwrap();
        engine
            .schedule_departure(VehicleId(2), AgentId(2), vec![a, free], Tick(0))
            .unwrap();

        let mut sink = Collect::default();
        engine.run_ticks(12, &mut sink).unwrap();

        // v0 plugs `full` until its arrival at t=5; the mirror frees the
        // slot at the t=5 → t=6 boundary.  Until then neither v1 (blocked
        // head) nor v2 (free target, but behind v1) may leave.
        assert_eq!(
            leaves_of(&sink.events, a),
            vec![(Tick(6), VehicleId(1)), (Tick(6), VehicleId(2))]
        );
        assert_eq!(
            arrivals_of(&sink.events),
            vec![
                (Tick(5), VehicleId(0)),
                (Tick(7), VehicleId(2)),
                (Tick(11), VehicleId(1)),
            ]
        );
        engine.shutdown().unwrap();
    }
}

// ── Flow capacity over time ───────────────────────────────────────────────────

#[cfg(test)]
mod flow_rate {
    use super::*;

    /// A 0.5 veh/tick segment releases at most one vehicle every other tick;
    /// the cumulative release count never beats the accumulator bound and
    /// order is strictly FIFO.
    #[test]
    fn half_capacity_segment_releases_every_other_tick() {
        let mut b = NetworkBuilder::new();
        let u = b.add_node();
        let n = b.add_node();
        let w = b.add_node();
        let x = b.add_node();
        let a = b.add_segment(u, n, 0.0, 10.0, 36_000.0, 1.0); // 10 veh/tick feeder
        let s = b.add_segment(n, w, 75.0, 75.0, 1_800.0, 1.0); // 0.5 veh/tick
        let c = b.add_segment(w, x, 0.0, 10.0, 36_000.0, 1.0);
        let net = b.build().unwrap();

        let mut engine = EngineBuilder::new(net, cfg(2)).build().unwrap();
        for v in 1..=6u32 {
            engine
                .schedule_departure(VehicleId(v), AgentId(v), vec![a, s, c], Tick(0))
                .unwrap();
        }

        let mut sink = Collect::default();
        engine.run_ticks(20, &mut sink).unwrap();

        let flows: Vec<(Tick, VehicleId)> = sink
            .events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::SegmentFlow { segment, vehicle } if segment == s => {
                    Some((e.time, vehicle))
                }
                _ => None,
            })
            .collect();

        assert_eq!(flows.len(), 6, "all six vehicles released: {flows:?}");

        // FIFO: released in entry order.
        let order: Vec<VehicleId> = flows.iter().map(|&(_, v)| v).collect();
        assert_eq!(order, (1..=6).map(VehicleId).collect::<Vec<_>>());

        // Rolling bound: within any prefix window of W ticks the release
        // count never exceeds flow × W plus the initial accumulator.
        for t in 0..20u64 {
            let upto = flows.iter().filter(|&&(tick, _)| tick.0 <= t).count() as f64;
            assert!(
                upto <= 0.5 * t as f64 + 1.0,
                "released {upto} vehicles by tick {t}"
            );
        }
        engine.shutdown().unwrap();
    }
}

// ── Validation & lifecycle ────────────────────────────────────────────────────

#[cfg(test)]
mod validation {
    use super::*;

    fn engine() -> (Engine, SegmentId, SegmentId) {
        let (net, a, s) = tight_chain();
        (EngineBuilder::new(net, cfg(1)).build().unwrap(), a, s)
    }

    #[test]
    fn route_errors_are_detected_before_the_run() {
        let (mut engine, a, s) = engine();

        let err = engine
            .schedule_departure(VehicleId(1), AgentId(1), vec![SegmentId(99)], Tick(0))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSegment { .. }));

        let err = engine
            .schedule_departure(VehicleId(1), AgentId(1), vec![], Tick(0))
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRoute { .. }));

        // s ends where nothing starts a — disconnected.
        let err = engine
            .schedule_departure(VehicleId(1), AgentId(1), vec![s, a], Tick(0))
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRoute { .. }));

        engine.shutdown().unwrap();
    }

    #[test]
    fn departure_in_the_past_is_rejected() {
        let (mut engine, a, s) = engine();
        engine.step(&mut NoopSink).unwrap();
        engine.step(&mut NoopSink).unwrap();

        let err = engine
            .schedule_departure(VehicleId(1), AgentId(1), vec![a, s], Tick(1))
            .unwrap_err();
        assert!(matches!(err, EngineError::DepartureInPast { .. }));

        // The next tick is fine.
        engine
            .schedule_departure(VehicleId(1), AgentId(1), vec![a, s], Tick(2))
            .unwrap();
        engine.shutdown().unwrap();
    }

    #[test]
    fn invalid_config_fails_build() {
        let (net, _, _) = tight_chain();
        let result = EngineBuilder::new(net, cfg(0)).build().map(|_| ());
        assert!(result.is_err());
    }

    #[test]
    fn drop_without_shutdown_joins_workers() {
        let (net, a, s) = tight_chain();
        let mut engine = EngineBuilder::new(net, cfg(4)).build().unwrap();
        engine
            .schedule_departure(VehicleId(1), AgentId(1), vec![a, s], Tick(0))
            .unwrap();
        engine.run_ticks(3, &mut NoopSink).unwrap();
        drop(engine); // must not hang or leak a parked worker
    }

    #[test]
    fn late_departures_enter_a_running_simulation() {
        let (mut engine, a, s) = engine();
        engine.run_ticks(5, &mut NoopSink).unwrap();

        engine
            .schedule_departure(VehicleId(9), AgentId(9), vec![a, s], Tick(7))
            .unwrap();
        let mut sink = Collect::default();
        engine.run_ticks(5, &mut sink).unwrap();
        assert_eq!(arrivals_of(&sink.events), vec![(Tick(7), VehicleId(9))]);
        engine.shutdown().unwrap();
    }
}

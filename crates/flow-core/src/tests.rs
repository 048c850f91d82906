//! Unit tests for flow-core primitives.

#[cfg(test)]
mod ids {
    use crate::{NodeId, SegmentId, VehicleId};

    #[test]
    fn index_roundtrip() {
        let id = SegmentId(42);
        assert_eq!(id.index(), 42);
        assert_eq!(SegmentId::try_from(42usize).unwrap(), id);
    }

    #[test]
    fn ordering() {
        assert!(SegmentId(0) < SegmentId(1));
        assert!(NodeId(100) > NodeId(99));
    }

    #[test]
    fn invalid_sentinels_are_max() {
        assert_eq!(NodeId::INVALID.0, u32::MAX);
        assert_eq!(SegmentId::INVALID.0, u32::MAX);
        assert_eq!(VehicleId::INVALID.0, u32::MAX);
    }

    #[test]
    fn display() {
        assert_eq!(VehicleId(7).to_string(), "VehicleId(7)");
    }
}

#[cfg(test)]
mod time {
    use crate::{EngineConfig, Tick};

    #[test]
    fn tick_arithmetic() {
        let t = Tick(10);
        assert_eq!(t + 5, Tick(15));
        assert_eq!(t.offset(3), Tick(13));
        assert_eq!(Tick(15) - Tick(10), 5u64);
    }

    #[test]
    fn time_secs_scales_with_tick_size() {
        let cfg = EngineConfig { tick_secs: 2.0, ..Default::default() };
        assert_eq!(cfg.time_secs(Tick(30)), 60.0);
    }

    #[test]
    fn ticks_for_secs_rounds_up() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.ticks_for_secs(0.5), 1);
        assert_eq!(cfg.ticks_for_secs(10.0), 10);
    }

    #[test]
    fn max_wait_ticks_disabled_by_infinity() {
        let cfg = EngineConfig {
            max_buffered_wait_secs: f64::INFINITY,
            ..Default::default()
        };
        assert_eq!(cfg.max_wait_ticks(), None);

        let cfg = EngineConfig {
            max_buffered_wait_secs: 90.0,
            tick_secs: 60.0,
            ..Default::default()
        };
        assert_eq!(cfg.max_wait_ticks(), Some(2));
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(EngineConfig { tick_secs: 0.0, ..Default::default() }.validate().is_err());
        assert!(EngineConfig { partitions: 0, ..Default::default() }.validate().is_err());
        assert!(EngineConfig { flow_scale: -1.0, ..Default::default() }.validate().is_err());
        assert!(EngineConfig::default().validate().is_ok());
    }
}

#[cfg(test)]
mod rng {
    use crate::{NodeId, NodeRng};

    #[test]
    fn deterministic_same_seed() {
        let mut r1 = NodeRng::new(12345, NodeId(0));
        let mut r2 = NodeRng::new(12345, NodeId(0));
        for _ in 0..100 {
            let a: u32 = r1.gen_range(0..1000);
            let b: u32 = r2.gen_range(0..1000);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn different_nodes_differ() {
        let mut r0 = NodeRng::new(1, NodeId(0));
        let mut r1 = NodeRng::new(1, NodeId(1));
        let a: u64 = r0.gen_range(0..u64::MAX);
        let b: u64 = r1.gen_range(0..u64::MAX);
        assert_ne!(a, b, "seeds for adjacent nodes should diverge");
    }

    #[test]
    fn shuffle_is_reproducible() {
        let mut r1 = NodeRng::new(7, NodeId(3));
        let mut r2 = NodeRng::new(7, NodeId(3));
        let mut a = [0, 1, 2, 3, 4, 5];
        let mut b = [0, 1, 2, 3, 4, 5];
        r1.shuffle(&mut a);
        r2.shuffle(&mut b);
        assert_eq!(a, b);
    }
}

#[cfg(test)]
mod vehicle {
    use crate::{AgentId, SegmentId, Tick, Vehicle, VehicleId};

    fn veh(route: &[u32]) -> Vehicle {
        let route: Box<[SegmentId]> = route.iter().map(|&s| SegmentId(s)).collect();
        Vehicle::new(VehicleId(1), AgentId(1), route)
    }

    #[test]
    fn cursor_walks_route() {
        let mut v = veh(&[3, 5, 9]);
        assert_eq!(v.current_segment(), SegmentId(3));
        assert_eq!(v.next_segment(), Some(SegmentId(5)));
        assert!(!v.on_final_segment());

        v.advance_route();
        v.advance_route();
        assert_eq!(v.current_segment(), SegmentId(9));
        assert_eq!(v.next_segment(), None);
        assert!(v.on_final_segment());
    }

    #[test]
    fn single_segment_route_is_final_immediately() {
        let v = veh(&[0]);
        assert!(v.on_final_segment());
        assert_eq!(v.next_segment(), None);
    }

    #[test]
    fn exit_time_defaults_to_zero() {
        let v = veh(&[0, 1]);
        assert_eq!(v.exit_time, Tick::ZERO);
    }
}

#[cfg(test)]
mod events {
    use crate::{EventKind, SegmentId, VehicleId};

    #[test]
    fn accessors() {
        let kind = EventKind::SegmentFlow {
            segment: SegmentId(4),
            vehicle: VehicleId(9),
        };
        assert_eq!(kind.name(), "segment_flow");
        assert_eq!(kind.segment(), SegmentId(4));
        assert_eq!(kind.vehicle(), VehicleId(9));
    }
}

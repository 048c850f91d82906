//! Tests for flow-output.

use std::path::Path;

use flow_core::{AgentId, EngineConfig, Tick, VehicleId};
use flow_engine::EngineBuilder;
use flow_net::NetworkBuilder;

use crate::{CsvWriter, EventLogWriter, EventRow, OutputWriter, TickSummaryRow};

fn read(dir: &Path, file: &str) -> String {
    std::fs::read_to_string(dir.join(file)).unwrap()
}

#[cfg(test)]
mod csv_backend {
    use super::*;

    #[test]
    fn writes_headers_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvWriter::new(dir.path()).unwrap();

        writer
            .write_events(&[
                EventRow { tick: 0, kind: "departed", segment: 1, vehicle: 7 },
                EventRow { tick: 0, kind: "segment_enter", segment: 1, vehicle: 7 },
            ])
            .unwrap();
        writer
            .write_tick_summary(&TickSummaryRow {
                tick: 0,
                events: 2,
                arrived: 0,
                stuck: 0,
                active_segments: 1,
            })
            .unwrap();
        writer.finish().unwrap();

        let events = read(dir.path(), "events.csv");
        assert_eq!(
            events,
            "tick,kind,segment,vehicle\n0,departed,1,7\n0,segment_enter,1,7\n"
        );
        let summaries = read(dir.path(), "tick_summaries.csv");
        assert!(summaries.starts_with("tick,events,arrived,stuck,active_segments\n"));
        assert!(summaries.contains("0,2,0,0,1\n"));
    }

    #[test]
    fn finish_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvWriter::new(dir.path()).unwrap();
        writer.finish().unwrap();
        writer.finish().unwrap();
    }
}

#[cfg(test)]
mod sink_bridge {
    use super::*;

    /// Drive a real two-segment engine run through the CSV sink and check
    /// the files record the whole trip.
    #[test]
    fn logs_a_complete_trip() {
        let mut b = NetworkBuilder::new();
        let u = b.add_node();
        let n = b.add_node();
        let w = b.add_node();
        let a = b.add_segment(u, n, 0.0, 10.0, 3600.0, 1.0);
        let s = b.add_segment(n, w, 0.0, 10.0, 3600.0, 1.0);
        let net = b.build().unwrap();

        let config = EngineConfig { partitions: 2, seed: 7, ..Default::default() };
        let mut engine = EngineBuilder::new(net, config).build().unwrap();
        engine
            .schedule_departure(VehicleId(3), AgentId(3), vec![a, s], Tick(0))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut sink = EventLogWriter::new(CsvWriter::new(dir.path()).unwrap());
        engine.run_ticks(3, &mut sink).unwrap();
        engine.shutdown().unwrap();
        sink.finish().unwrap();
        assert!(sink.take_error().is_none());

        let events = read(dir.path(), "events.csv");
        let lines: Vec<&str> = events.lines().collect();
        assert_eq!(
            lines,
            vec![
                "tick,kind,segment,vehicle",
                "0,departed,0,3",
                "0,segment_enter,0,3",
                "0,segment_flow,0,3",
                "0,segment_leave,0,3",
                "0,segment_enter,1,3",
                "0,arrived,1,3",
            ]
        );

        let summaries = read(dir.path(), "tick_summaries.csv");
        let lines: Vec<&str> = summaries.lines().collect();
        assert_eq!(lines[0], "tick,events,arrived,stuck,active_segments");
        assert_eq!(lines[1], "0,6,1,0,0");
        assert_eq!(lines.len(), 4, "one summary row per tick");
    }
}

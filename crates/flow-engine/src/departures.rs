//! Departure scheduling and admission.
//!
//! Scheduled trips sit in a sparse per-tick queue until their departure
//! tick, then move into a per-segment FIFO waiting list.  Each tick the
//! coordinator admits waiting vehicles onto their first segment while the
//! occupancy mirror shows space, reserving the slot in the mirror
//! immediately; a blocked list head blocks the vehicles behind it so
//! departure order is preserved under backpressure.
//!
//! Admission runs single-threaded between ticks, which is what lets it read
//! and update the mirror without coordination.

use std::collections::{BTreeMap, VecDeque};

use flow_core::{SegmentId, Tick, Vehicle};
use flow_net::{Network, OccupancyMirror};

use crate::partition::segment_partition;

/// Trips waiting to start.
#[derive(Default)]
pub(crate) struct DepartureQueue {
    /// Not yet due, keyed by departure tick.
    future: BTreeMap<Tick, Vec<Vehicle>>,
    /// Due but not yet admitted, FIFO per first segment.
    waiting: BTreeMap<SegmentId, VecDeque<Vehicle>>,
    pending: usize,
}

impl DepartureQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips scheduled or waiting, in total.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Register a validated trip for departure at `depart`.
    pub fn schedule(&mut self, depart: Tick, vehicle: Vehicle) {
        self.future.entry(depart).or_default().push(vehicle);
        self.pending += 1;
    }

    /// Admit every due departure that fits, routing each admitted vehicle to
    /// the inject mailbox of its first segment's owning partition.
    ///
    /// Returns the number of admitted vehicles.  Waiting lists are visited
    /// in ascending segment id and drained head-first, so the result is
    /// independent of scheduling call order across segments and preserves it
    /// within a segment.
    pub fn admit(
        &mut self,
        now: Tick,
        net: &Network,
        mirror: &OccupancyMirror,
        partitions: usize,
        inject: &mut [Vec<(SegmentId, Vehicle)>],
    ) -> usize {
        // Move due trips into their segment's waiting list.
        let due: Vec<Tick> = self
            .future
            .range(..=now)
            .map(|(&tick, _)| tick)
            .collect();
        for tick in due {
            if let Some(batch) = self.future.remove(&tick) {
                for vehicle in batch {
                    let first = vehicle.current_segment();
                    self.waiting.entry(first).or_default().push_back(vehicle);
                }
            }
        }

        // Head-first admission against the mirror.
        let mut admitted = 0;
        for (&segment, list) in self.waiting.iter_mut() {
            while let Some(head) = list.front() {
                if !mirror.has_space(segment, 0) {
                    break;
                }
                debug_assert_eq!(head.current_segment(), segment);
                mirror.add(segment, 1);
                let vehicle = match list.pop_front() {
                    Some(v) => v,
                    None => break,
                };
                let owner = segment_partition(net, segment, partitions);
                inject[owner].push((segment, vehicle));
                admitted += 1;
            }
        }
        self.waiting.retain(|_, list| !list.is_empty());
        self.pending -= admitted;
        admitted
    }
}

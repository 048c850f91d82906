//! The cross-partition exchange and shared synchronization state.
//!
//! All cross-partition traffic flows through [`Exchange`], a mailbox struct
//! behind a single mutex that is locked only inside barrier windows:
//!
//! | Lane            | Writer → Reader           | Window                    |
//! |-----------------|---------------------------|---------------------------|
//! | `inject`        | coordinator → runner      | between ticks → tick start|
//! | `entries`       | runner → runner           | separation barrier        |
//! | `activated` /   | runner → ledger           | separation barrier        |
//! | `deactivated`   | (leader folds)            | (single-threaded action)  |
//! | `events`,       | runner → coordinator      | end barrier → between     |
//! | `occupancy`,    |                           | ticks                     |
//! | `arrived`,      |                           |                           |
//! | `stuck`         |                           |                           |
//!
//! During the node and link phases nothing touches the mutex, so movement is
//! lock-free; the mutex only serializes the already-serialized rendezvous
//! points.

use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{Barrier, Mutex, MutexGuard};

use flow_core::{Event, SegmentId, Vehicle};
use flow_net::{ActivationLedger, SegmentEntry};

use crate::{StuckRemoval, TripEnd};

// ── Event keys ────────────────────────────────────────────────────────────────

/// Sub-tick phases, in canonical order.
pub(crate) const PHASE_INJECT: u8 = 0;
pub(crate) const PHASE_NODE: u8 = 1;
pub(crate) const PHASE_LINK: u8 = 2;

/// An event plus the key that fixes its place in the canonical per-tick
/// order: `(phase, producer, seq)`.  The producer is the node id during the
/// node phase and the segment id otherwise; `seq` is the emission index
/// within that producer's tick.  Sorting by this key reproduces
/// single-threaded execution order regardless of partitioning.
#[derive(Debug, Clone, Copy)]
pub(crate) struct KeyedEvent {
    pub phase: u8,
    pub producer: u32,
    pub seq: u32,
    pub event: Event,
}

// ── Exchange ──────────────────────────────────────────────────────────────────

/// Mailboxes for everything that crosses a partition boundary.
/// All `Vec`s are indexed by partition.
pub(crate) struct Exchange {
    /// Admitted departures, routed to the owner of the first segment.
    pub inject: Vec<Vec<(SegmentId, Vehicle)>>,
    /// Vehicles crossing into another partition's segments, indexed by the
    /// receiving partition.
    pub entries: Vec<Vec<SegmentEntry>>,
    /// Per-partition event buffers for the tick.
    pub events: Vec<Vec<KeyedEvent>>,
    /// `(segment, occupants)` updates for the occupancy mirror.
    pub occupancy: Vec<Vec<(SegmentId, u32)>>,
    /// Finished trips.
    pub arrived: Vec<Vec<TripEnd>>,
    /// Stuck removals.
    pub stuck: Vec<Vec<StuckRemoval>>,
    /// Segments each partition activated / deactivated, folded into the
    /// ledger by the separation-barrier leader.
    pub activated: Vec<Vec<SegmentId>>,
    pub deactivated: Vec<Vec<SegmentId>>,
    /// Container-level activation bookkeeping.
    pub ledger: ActivationLedger,
}

impl Exchange {
    pub fn new(partitions: usize) -> Self {
        fn bins<T>(n: usize) -> Vec<Vec<T>> {
            (0..n).map(|_| Vec::new()).collect()
        }
        Self {
            inject: bins(partitions),
            entries: bins(partitions),
            events: bins(partitions),
            occupancy: bins(partitions),
            arrived: bins(partitions),
            stuck: bins(partitions),
            activated: bins(partitions),
            deactivated: bins(partitions),
            ledger: ActivationLedger::new(),
        }
    }
}

// ── Shared ────────────────────────────────────────────────────────────────────

/// State shared between the coordinator and all runners for the whole run.
pub(crate) struct Shared {
    /// Tick start rendezvous: all runners + the coordinator.  The
    /// coordinator publishes `tick` (or raises `stop`) before arriving.
    pub start: Barrier,
    /// Mid-tick rendezvous between the node and link phases: runners only.
    pub separation: Barrier,
    /// Tick end rendezvous: all runners + the coordinator.
    pub end: Barrier,
    /// Current tick, published by the coordinator before the start barrier.
    pub tick: AtomicU64,
    /// Raised to terminate the runner loops (shutdown or fatal error).
    pub stop: AtomicBool,
    /// First runner failure, if any.  Fatal to the run.
    pub error: Mutex<Option<String>>,
    pub exchange: Mutex<Exchange>,
}

impl Shared {
    pub fn new(partitions: usize) -> Self {
        Self {
            start: Barrier::new(partitions + 1),
            separation: Barrier::new(partitions),
            end: Barrier::new(partitions + 1),
            tick: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            error: Mutex::new(None),
            exchange: Mutex::new(Exchange::new(partitions)),
        }
    }

    /// Lock the exchange, tolerating poison: a poisoned lock means some
    /// runner panicked, which the error slot already records, and the
    /// mailbox data is still structurally sound.
    pub fn lock_exchange(&self) -> MutexGuard<'_, Exchange> {
        match self.exchange.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record a fatal runner error (first one wins) and raise the stop flag.
    pub fn record_error(&self, message: String) {
        self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
        let mut slot = match self.error.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_none() {
            *slot = Some(message);
        }
    }

    /// Take the recorded error, if any.
    pub fn take_error(&self) -> Option<String> {
        let mut slot = match self.error.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.take()
    }
}

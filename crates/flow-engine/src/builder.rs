//! Fluent builder for constructing an [`Engine`].

use std::sync::Arc;
use std::thread;

use flow_core::EngineConfig;
use flow_net::{Network, OccupancyMirror};
use flow_signals::{AlwaysGreen, SignalControl, SignalTable};

use crate::departures::DepartureQueue;
use crate::exchange::Shared;
use crate::partition::Partition;
use crate::runner::Runner;
use crate::{Engine, EngineError, EngineResult};

/// Fluent builder for [`Engine`].
///
/// # Required inputs
///
/// - [`Network`] — built and validated by [`flow_net::NetworkBuilder`]
/// - [`EngineConfig`] — tick size, partition count, capacity scales, …
///
/// # Optional inputs
///
/// | Method        | Default                                   |
/// |---------------|-------------------------------------------|
/// | `.signals(c)` | [`AlwaysGreen`] (every approach always Go) |
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new(network, EngineConfig::default())
///     .signals(Box::new(FixedTimeControl::new().with_plan(node, seg, plan)))
///     .build()?;
/// ```
///
/// `build()` spawns the worker threads; they park at the start barrier until
/// the first [`Engine::step`] call.
pub struct EngineBuilder {
    network: Network,
    config: EngineConfig,
    controller: Box<dyn SignalControl>,
}

impl EngineBuilder {
    pub fn new(network: Network, config: EngineConfig) -> Self {
        Self {
            network,
            config,
            controller: Box::new(AlwaysGreen),
        }
    }

    /// Inject a signal controller.  Plans are validated against the network
    /// in `build()`.
    pub fn signals(mut self, controller: Box<dyn SignalControl>) -> Self {
        self.controller = controller;
        self
    }

    /// Validate the configuration and controller, partition the network,
    /// and spawn the worker threads.
    pub fn build(self) -> EngineResult<Engine> {
        self.config.validate()?;

        // Topology check for every approach the controller references: the
        // node must exist, be signalized, and be fed by the segment.
        for (node, segment) in self.controller.referenced_approaches() {
            let valid = node.index() < self.network.node_count()
                && self.network.is_signalized(node)
                && self.network.in_segments(node).contains(&segment);
            if !valid {
                return Err(EngineError::SignalReference { node, segment });
            }
        }

        let partitions = self.config.partitions;
        let net = Arc::new(self.network);
        let cfg = Arc::new(self.config);
        let mirror = OccupancyMirror::new(net.storage_caps(&cfg));
        let signal_table = Arc::new(SignalTable::new(&net.signalized_approaches()));
        let shared = Arc::new(Shared::new(partitions));

        if cfg.eager_segments {
            let mut ex = shared.lock_exchange();
            for s in 0..net.segment_count() {
                ex.ledger.activate(flow_core::SegmentId(s as u32));
            }
            // Drop the initial burst so the first tick reports only genuine
            // new activations.
            ex.ledger.collect_newly_activated();
        }

        let mut handles = Vec::with_capacity(partitions);
        for index in 0..partitions {
            let partition = Partition::build(index, partitions, &net, &cfg);
            let runner = Runner::new(
                index,
                partitions,
                Arc::clone(&shared),
                Arc::clone(&net),
                Arc::clone(&cfg),
                mirror.clone(),
                Arc::clone(&signal_table),
                partition,
            );
            let handle = thread::Builder::new()
                .name(format!("flow-runner-{index}"))
                .spawn(move || runner.run())
                .map_err(|e| EngineError::RunnerFailed(format!("failed to spawn worker: {e}")))?;
            handles.push(handle);
        }

        log::info!(
            "engine prepared: {} nodes, {} segments, {} partitions",
            net.node_count(),
            net.segment_count(),
            partitions
        );

        Ok(Engine {
            shared,
            handles,
            net,
            cfg,
            mirror,
            signal_table,
            controller: self.controller,
            departures: DepartureQueue::new(),
            next_tick: flow_core::Tick::ZERO,
            failed: None,
            joined: false,
        })
    }
}

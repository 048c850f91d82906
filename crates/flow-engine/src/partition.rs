//! Partitioning of nodes and segments across workers.
//!
//! Nodes are assigned round-robin by id and never move — the assignment must
//! stay fixed so each node's RNG sequence is consumed by one thread for the
//! whole run.  A segment belongs to the partition of its **destination**
//! node: that node pops the segment's exit buffer during the node phase, and
//! pops cannot be deferred across a barrier the way enqueues can, so
//! attaching segments to their consuming node keeps the entire node phase
//! partition-local.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use flow_core::{EngineConfig, NodeId, NodeRng, SegmentId};
use flow_net::{Network, SimNode, SimSegment};

/// Partition owning a node.
#[inline]
pub(crate) fn node_partition(node: NodeId, partitions: usize) -> usize {
    node.index() % partitions
}

/// Partition owning a segment (= the partition of its destination node).
#[inline]
pub(crate) fn segment_partition(net: &Network, segment: SegmentId, partitions: usize) -> usize {
    node_partition(net.to(segment), partitions)
}

/// One worker's share of the network.
pub(crate) struct Partition {
    /// Owned nodes in ascending id order.
    pub nodes: Vec<SimNode>,
    /// NodeId → index into `nodes`.
    pub node_pos: FxHashMap<NodeId, usize>,
    /// Owned segments (every segment whose destination node is owned).
    pub segments: FxHashMap<SegmentId, SimSegment>,
    /// All owned segment ids in ascending order (for eager iteration).
    pub all_segments: Vec<SegmentId>,
    /// Segments with link-phase work, maintained per tick in lazy mode.
    pub active_segments: BTreeSet<SegmentId>,
    /// Nodes with buffered vehicles on some approach, lazy mode.
    pub active_nodes: BTreeSet<NodeId>,
}

impl Partition {
    /// Build partition `index` of `partitions` from the shared network.
    pub fn build(index: usize, partitions: usize, net: &Network, cfg: &EngineConfig) -> Self {
        let mut nodes = Vec::new();
        let mut node_pos = FxHashMap::default();
        for n in 0..net.node_count() {
            let id = NodeId(n as u32);
            if node_partition(id, partitions) != index {
                continue;
            }
            node_pos.insert(id, nodes.len());
            nodes.push(SimNode::new(
                id,
                net.is_signalized(id),
                net.in_segments(id).into(),
                NodeRng::new(cfg.seed, id),
            ));
        }

        let mut segments = FxHashMap::default();
        let mut all_segments = Vec::new();
        for s in 0..net.segment_count() {
            let id = SegmentId(s as u32);
            if segment_partition(net, id, partitions) != index {
                continue;
            }
            segments.insert(id, SimSegment::new(id, net, cfg));
            all_segments.push(id);
        }

        let active_segments = if cfg.eager_segments {
            all_segments.iter().copied().collect()
        } else {
            BTreeSet::new()
        };
        let active_nodes = if cfg.eager_nodes {
            nodes.iter().map(|n| n.id()).collect()
        } else {
            BTreeSet::new()
        };

        Self {
            nodes,
            node_pos,
            segments,
            all_segments,
            active_segments,
            active_nodes,
        }
    }
}

//! Network container and builder.
//!
//! # Data layout
//!
//! Nodes and segments live in flat arrays indexed by `NodeId`/`SegmentId` —
//! all topology references are integer indices, never pointers, so the
//! structure has no reference cycles and partitions trivially by index.
//!
//! Adjacency uses **Compressed Sparse Row (CSR)** in both directions.  Given
//! a `NodeId n`, its incoming segments occupy the slice:
//!
//! ```text
//! in_segments[ node_in_start[n] .. node_in_start[n+1] ]
//! ```
//!
//! and likewise `out_segments`/`node_out_start` for outgoing segments.
//! Segment ids are assigned in insertion order and never reordered, because
//! routes supplied by external collaborators reference them directly.
//!
//! The container is immutable after `build()` and shared across workers via
//! `Arc`.  All mutable per-segment state lives in [`SimSegment`]s owned by
//! exactly one worker; the only mutable container-level state is the
//! [`ActivationLedger`], which is touched solely inside barrier windows.
//!
//! [`SimSegment`]: crate::SimSegment
//! [`ActivationLedger`]: crate::ActivationLedger

use rustc_hash::FxHashMap;

use flow_core::{EngineConfig, FlowError, FlowResult, NodeId, SegmentId, Tick};

use crate::{AttributeChange, ChangeValue, NetError, NetResult};

/// Space one queued vehicle occupies on a segment, in metres.
pub const EFFECTIVE_CELL_SIZE_M: f64 = 7.5;

// ── SegmentAttrs ──────────────────────────────────────────────────────────────

/// Physical attributes of one segment, as loaded (or as overridden by a
/// time-variant change).
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentAttrs {
    /// Length in metres.
    pub length_m: f64,
    /// Free-flow speed in m/s.
    pub freespeed_ms: f64,
    /// Flow capacity in vehicles per hour.
    pub capacity_veh_h: f64,
    /// Permanent lane count.
    pub lanes: f64,
}

// ── SegmentParams ─────────────────────────────────────────────────────────────

/// Simulation parameters derived from [`SegmentAttrs`] and the engine
/// configuration.  Recomputed whenever a time-variant change applies.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SegmentParams {
    /// Free-flow travel time in whole ticks (floor; 0 is allowed).
    pub fft_ticks: u64,
    /// Flow capacity in vehicles per tick (fractional).
    pub flow_per_tick: f64,
    /// Storage capacity in vehicles (fractional; admission is `stored < cap`).
    pub storage_cap: f64,
    /// Exit-buffer slots: one tick's worth of flow, at least one vehicle.
    pub buffer_cap: usize,
}

impl SegmentParams {
    /// Derive parameters from attributes.
    ///
    /// The storage rule follows the queue-model convention: storage is the
    /// cell-based value scaled by `storage_scale`, but never below one tick's
    /// flow (so a high-capacity short segment can still pass its flow) and
    /// never below one vehicle.
    pub fn derive(attrs: &SegmentAttrs, cfg: &EngineConfig) -> Self {
        let flow_per_tick = attrs.capacity_veh_h * cfg.flow_scale / 3600.0 * cfg.tick_secs;
        let cell_storage =
            attrs.length_m * attrs.lanes * cfg.storage_scale / EFFECTIVE_CELL_SIZE_M;
        let storage_cap = cell_storage.max(flow_per_tick.ceil()).max(1.0);
        let fft_ticks = (attrs.length_m / attrs.freespeed_ms / cfg.tick_secs).floor() as u64;
        let buffer_cap = (flow_per_tick.ceil() as usize).max(1);
        Self {
            fft_ticks,
            flow_per_tick,
            storage_cap,
            buffer_cap,
        }
    }
}

// ── Network ───────────────────────────────────────────────────────────────────

/// Immutable network topology and static segment attributes.
///
/// Do not construct directly; use [`NetworkBuilder`].
pub struct Network {
    // ── Node data ─────────────────────────────────────────────────────────
    /// `true` for nodes under signal control.  Indexed by `NodeId`.
    node_signalized: Vec<bool>,

    // ── CSR adjacency ─────────────────────────────────────────────────────
    /// CSR row pointer for incoming segments.  Length = `node_count + 1`.
    node_in_start: Vec<u32>,
    /// Incoming segment ids grouped by destination node.
    in_segments: Vec<SegmentId>,
    /// CSR row pointer for outgoing segments.  Length = `node_count + 1`.
    node_out_start: Vec<u32>,
    /// Outgoing segment ids grouped by origin node.
    out_segments: Vec<SegmentId>,

    // ── Segment data (indexed by SegmentId = insertion order) ─────────────
    seg_from: Vec<NodeId>,
    seg_to: Vec<NodeId>,
    seg_attrs: Vec<SegmentAttrs>,

    /// Time-variant changes per segment, sorted by change tick.
    changes: FxHashMap<SegmentId, Vec<AttributeChange>>,
}

impl Network {
    // ── Dimensions ────────────────────────────────────────────────────────

    pub fn node_count(&self) -> usize {
        self.node_signalized.len()
    }

    pub fn segment_count(&self) -> usize {
        self.seg_from.len()
    }

    // ── Topology lookups ──────────────────────────────────────────────────

    /// Incoming segments of `node` (contiguous CSR slice, no allocation).
    #[inline]
    pub fn in_segments(&self, node: NodeId) -> &[SegmentId] {
        let start = self.node_in_start[node.index()] as usize;
        let end = self.node_in_start[node.index() + 1] as usize;
        &self.in_segments[start..end]
    }

    /// Outgoing segments of `node`.
    #[inline]
    pub fn out_segments(&self, node: NodeId) -> &[SegmentId] {
        let start = self.node_out_start[node.index()] as usize;
        let end = self.node_out_start[node.index() + 1] as usize;
        &self.out_segments[start..end]
    }

    /// Origin node of `segment`.
    #[inline]
    pub fn from(&self, segment: SegmentId) -> NodeId {
        self.seg_from[segment.index()]
    }

    /// Destination node of `segment` — the node that consumes its exit buffer.
    #[inline]
    pub fn to(&self, segment: SegmentId) -> NodeId {
        self.seg_to[segment.index()]
    }

    #[inline]
    pub fn is_signalized(&self, node: NodeId) -> bool {
        self.node_signalized[node.index()]
    }

    /// Static attributes of `segment` (before time-variant changes).
    #[inline]
    pub fn attrs(&self, segment: SegmentId) -> SegmentAttrs {
        self.seg_attrs[segment.index()]
    }

    /// Time-variant changes for `segment`, sorted by change tick.
    pub fn changes_for(&self, segment: SegmentId) -> &[AttributeChange] {
        self.changes.get(&segment).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every `(node, incoming segment)` approach at a signalized node, in id
    /// order.  This is the set of approaches registered with the signal table.
    pub fn signalized_approaches(&self) -> Vec<(NodeId, SegmentId)> {
        let mut out = Vec::new();
        for n in 0..self.node_count() {
            let node = NodeId(n as u32);
            if self.node_signalized[n] {
                for &seg in self.in_segments(node) {
                    out.push((node, seg));
                }
            }
        }
        out
    }

    // ── Route validation ──────────────────────────────────────────────────

    /// Check that `route` is non-empty, references only existing segments,
    /// and is connected (each segment ends where the next begins).
    pub fn validate_route(&self, route: &[SegmentId]) -> FlowResult<()> {
        if route.is_empty() {
            return Err(FlowError::Config("route must not be empty".into()));
        }
        for &seg in route {
            if seg.index() >= self.segment_count() {
                return Err(FlowError::SegmentNotFound(seg));
            }
        }
        for pair in route.windows(2) {
            if self.to(pair[0]) != self.from(pair[1]) {
                return Err(FlowError::Config(format!(
                    "route is disconnected: {} ends at {} but {} starts at {}",
                    pair[0],
                    self.to(pair[0]),
                    pair[1],
                    self.from(pair[1])
                )));
            }
        }
        Ok(())
    }

    /// Per-segment storage capacities, for the cross-partition occupancy
    /// mirror.
    pub fn storage_caps(&self, cfg: &EngineConfig) -> Vec<f64> {
        self.seg_attrs
            .iter()
            .map(|attrs| SegmentParams::derive(attrs, cfg).storage_cap)
            .collect()
    }
}

// ── NetworkBuilder ────────────────────────────────────────────────────────────

/// Construct a [`Network`] incrementally, then call [`build`](Self::build).
///
/// The builder accepts nodes, directed segments, and time-variant changes in
/// any order.  `build()` validates attributes, constructs the CSR arrays, and
/// sorts change lists.
///
/// # Example
///
/// ```
/// use flow_net::NetworkBuilder;
///
/// let mut b = NetworkBuilder::new();
/// let u = b.add_node();
/// let v = b.add_node();
/// // 300 m, 15 m/s, 1800 veh/h, 1 lane
/// let s = b.add_segment(u, v, 300.0, 15.0, 1800.0, 1.0);
/// let net = b.build().unwrap();
/// assert_eq!(net.from(s), u);
/// assert_eq!(net.in_segments(v), &[s]);
/// ```
pub struct NetworkBuilder {
    nodes: Vec<bool>,
    raw_segments: Vec<RawSegment>,
    raw_changes: Vec<(SegmentId, AttributeChange)>,
}

struct RawSegment {
    from: NodeId,
    to: NodeId,
    attrs: SegmentAttrs,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            raw_segments: Vec::new(),
            raw_changes: Vec::new(),
        }
    }

    /// Pre-allocate for the expected number of nodes and segments to reduce
    /// reallocations when bulk-loading a large network.
    pub fn with_capacity(nodes: usize, segments: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(nodes),
            raw_segments: Vec::with_capacity(segments),
            raw_changes: Vec::new(),
        }
    }

    /// Add an uncontrolled node and return its `NodeId` (sequential from 0).
    pub fn add_node(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(false);
        id
    }

    /// Add a node under signal control.
    pub fn add_signalized_node(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(true);
        id
    }

    /// Add a **directed** segment from `from` to `to`.
    ///
    /// - `length_m`: physical length in metres.
    /// - `freespeed_ms`: free-flow speed in m/s (must be positive).
    /// - `capacity_veh_h`: flow capacity in vehicles/hour.
    /// - `lanes`: permanent lane count (must be positive).
    pub fn add_segment(
        &mut self,
        from: NodeId,
        to: NodeId,
        length_m: f64,
        freespeed_ms: f64,
        capacity_veh_h: f64,
        lanes: f64,
    ) -> SegmentId {
        let id = SegmentId(self.raw_segments.len() as u32);
        self.raw_segments.push(RawSegment {
            from,
            to,
            attrs: SegmentAttrs {
                length_m,
                freespeed_ms,
                capacity_veh_h,
                lanes,
            },
        });
        id
    }

    /// Schedule a time-variant attribute change on `segment` from `at` onward.
    pub fn add_change(&mut self, segment: SegmentId, at: Tick, value: ChangeValue) {
        self.raw_changes.push((segment, AttributeChange { at, value }));
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn segment_count(&self) -> usize {
        self.raw_segments.len()
    }

    /// Validate and produce a [`Network`].
    ///
    /// Time complexity: O(S) for the CSR counting sort plus O(C log C) for
    /// change sorting, where S = segments, C = changes.
    pub fn build(self) -> NetResult<Network> {
        let node_count = self.nodes.len();
        let seg_count = self.raw_segments.len();

        // ── Validate ──────────────────────────────────────────────────────
        for (i, raw) in self.raw_segments.iter().enumerate() {
            let segment = SegmentId(i as u32);
            for node in [raw.from, raw.to] {
                if node.index() >= node_count {
                    return Err(NetError::MissingEndpoint { segment, node });
                }
            }
            let a = &raw.attrs;
            if !(a.freespeed_ms > 0.0) {
                return Err(NetError::BadFreespeed { segment, value: a.freespeed_ms });
            }
            if !(a.lanes > 0.0) {
                return Err(NetError::BadLanes { segment, value: a.lanes });
            }
            if a.length_m < 0.0 {
                return Err(NetError::BadLength { segment, value: a.length_m });
            }
            if a.capacity_veh_h < 0.0 {
                return Err(NetError::BadCapacity { segment, value: a.capacity_veh_h });
            }
        }
        for &(segment, change) in &self.raw_changes {
            if segment.index() >= seg_count {
                return Err(NetError::ChangeUnknownSegment(segment));
            }
            match change.value {
                ChangeValue::Freespeed(v) if !(v > 0.0) => {
                    return Err(NetError::BadChange {
                        segment,
                        what: format!("free-flow speed must be positive, got {v}"),
                    });
                }
                ChangeValue::FlowCapacity(v) if v < 0.0 => {
                    return Err(NetError::BadChange {
                        segment,
                        what: format!("negative flow capacity {v}"),
                    });
                }
                _ => {}
            }
        }

        // ── CSR construction (counting sort, both directions) ─────────────
        let mut node_in_start = vec![0u32; node_count + 1];
        let mut node_out_start = vec![0u32; node_count + 1];
        for raw in &self.raw_segments {
            node_in_start[raw.to.index() + 1] += 1;
            node_out_start[raw.from.index() + 1] += 1;
        }
        for i in 1..=node_count {
            node_in_start[i] += node_in_start[i - 1];
            node_out_start[i] += node_out_start[i - 1];
        }

        let mut in_segments = vec![SegmentId::INVALID; seg_count];
        let mut out_segments = vec![SegmentId::INVALID; seg_count];
        let mut in_fill = node_in_start.clone();
        let mut out_fill = node_out_start.clone();
        for (i, raw) in self.raw_segments.iter().enumerate() {
            let seg = SegmentId(i as u32);
            in_segments[in_fill[raw.to.index()] as usize] = seg;
            in_fill[raw.to.index()] += 1;
            out_segments[out_fill[raw.from.index()] as usize] = seg;
            out_fill[raw.from.index()] += 1;
        }

        // ── Sort change lists per segment ─────────────────────────────────
        let mut changes: FxHashMap<SegmentId, Vec<AttributeChange>> = FxHashMap::default();
        for (segment, change) in self.raw_changes {
            changes.entry(segment).or_default().push(change);
        }
        for list in changes.values_mut() {
            list.sort_by_key(|c| c.at);
        }

        Ok(Network {
            node_signalized: self.nodes,
            node_in_start,
            in_segments,
            node_out_start,
            out_segments,
            seg_from: self.raw_segments.iter().map(|r| r.from).collect(),
            seg_to: self.raw_segments.iter().map(|r| r.to).collect(),
            seg_attrs: self.raw_segments.iter().map(|r| r.attrs).collect(),
            changes,
        })
    }
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

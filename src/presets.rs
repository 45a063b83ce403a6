// PCHASE-SWEEP BUILT-IN STUDIES
// THE THREE CLASSIC SWEEPS AS Study VALUES. THEY DIFFER ONLY IN AXES, SIZES
// AND AGGREGATION MODE; EVERYTHING ELSE IS THE SAME MATRIX/EMIT/INVOKE PATH.

use crate::matrix::{AggregateMode, OutputLayout, Study, DEFAULT_DURATION_SECS};
use crate::pattern::AccessPattern::{Load, Store};
use crate::pattern::{
    AccessPair, ByteSize, Node, NodeBinding, Placement, StridePoint, ThreadTopology, TopologyKind,
};

// CACHE LINES TOUCHED PER AGGRESSOR ACCESS
pub const POLLUTION_CACHELINES: [u32; 10] = [1, 2, 3, 4, 6, 8, 12, 16, 24, 32];

pub const POLLUTION_ACCESS: [AccessPair; 4] = [
    AccessPair::new(Load, Load),
    AccessPair::new(Store, Load),
    AccessPair::new(Load, Store),
    AccessPair::new(Store, Store),
];

pub const THREAD_ACCESS: [AccessPair; 4] = [
    AccessPair::new(Load, Load),
    AccessPair::new(Load, Store),
    AccessPair::new(Store, Store),
    AccessPair::new(Store, Load),
];

pub const THREAD_TOPOLOGIES: [ThreadTopology; 3] = [
    ThreadTopology::new(TopologyKind::Intra, 2),
    ThreadTopology::new(TopologyKind::Inter, 2),
    ThreadTopology::new(TopologyKind::Inter, 4),
];

// 1, 2, 4 .. 64
pub const THREAD_STRIDE_SHIFTS: u32 = 7;

// (VICTIM, AGGRESSOR)
pub const STRIDE_PAIRS: [(u32, u32); 3] = [(64, 64), (64, 1), (1, 64)];

/// Victim and one aggressor, each pinned to a node, across five placements
/// relative to the baseline node. Pivoted into `reformat-<stub>`.
pub fn pollution(node: u32, node1: u32) -> Study {
    let n = Node::Id(node);
    let n1 = Node::Id(node1);
    let base = Node::Baseline;
    let bindings = [(base, base), (base, n), (n, base), (n, n), (n, n1)];

    Study {
        name: "pollution".to_string(),
        access: POLLUTION_ACCESS.to_vec(),
        placements: bindings
            .iter()
            .map(|&(v, a)| Placement::Binding(NodeBinding::new(v, a)))
            .collect(),
        strides: POLLUTION_CACHELINES.iter().map(|&c| StridePoint::aggressor(c)).collect(),
        node,
        baseline_node: 0,
        victim_size: ByteSize::mib(1),
        aggressor_size: ByteSize::mib(2),
        duration_secs: DEFAULT_DURATION_SECS,
        mode: AggregateMode::Pivot,
        header: false,
        // BINDINGS COLLIDE WHEN node == 0 OR node == node1
        layout: OutputLayout::Combined,
    }
}

/// Victim plus 1..3 aggressors on a shared or distinct core, all on `node`.
/// Raw capture with a column header per file.
pub fn threads(node: u32) -> Study {
    Study {
        name: "threads".to_string(),
        access: THREAD_ACCESS.to_vec(),
        placements: THREAD_TOPOLOGIES.iter().map(|&t| Placement::Topology(t)).collect(),
        strides: (0..THREAD_STRIDE_SHIFTS).map(|s| StridePoint::aggressor(1 << s)).collect(),
        node,
        baseline_node: 0,
        victim_size: ByteSize::mib(32),
        aggressor_size: ByteSize::mib(32),
        duration_secs: DEFAULT_DURATION_SECS,
        mode: AggregateMode::Raw,
        header: true,
        layout: OutputLayout::PerCombination,
    }
}

/// Victim and aggressor on separate cores, sweeping both strides together.
pub fn stride_pairs(node: u32) -> Study {
    Study {
        name: "stride-pairs".to_string(),
        access: THREAD_ACCESS.to_vec(),
        placements: vec![Placement::Topology(ThreadTopology::new(TopologyKind::Inter, 2))],
        strides: STRIDE_PAIRS.iter().map(|&(v, a)| StridePoint::pair(v, a)).collect(),
        node,
        baseline_node: 0,
        victim_size: ByteSize::mib(32),
        aggressor_size: ByteSize::mib(32),
        duration_secs: DEFAULT_DURATION_SECS,
        mode: AggregateMode::Raw,
        header: false,
        layout: OutputLayout::PerCombination,
    }
}

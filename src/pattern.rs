// PCHASE-SWEEP MATRIX AXES
// ACCESS PATTERNS, NUMA PLACEMENTS, THREAD TOPOLOGIES, STRIDES, BUFFER SIZES
//
// EVERY AXIS VALUE HAS A STRING FORM SHARED BY THE CLI, TOML STUDY FILES AND
// OUTPUT FILE NAMES:
//   ACCESS PAIR:  load_store          (VICTIM_AGGRESSOR)
//   PLACEMENT:    0_1 / base_1        (NODE BINDING, base = BASELINE NODE)
//                 intra_2 / inter_4   (THREAD TOPOLOGY + THREAD COUNT)
//   STRIDE:       4 / 64:1            (AGGRESSOR ONLY / VICTIM:AGGRESSOR)
//   SIZE:         512k / 32m / 1g

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::SweepError;

fn invalid(what: &str, s: &str) -> SweepError {
    SweepError::InvalidStudy(format!("bad {} '{}'", what, s))
}

// ---------------------------------------------------------------------------
// ACCESS PATTERNS
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPattern {
    Load,
    Store,
}

impl AccessPattern {
    pub fn label(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for AccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AccessPattern {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "load" => Ok(Self::Load),
            "store" => Ok(Self::Store),
            other => Err(invalid("access pattern", other)),
        }
    }
}

/// Ordered (victim, aggressor) access pattern pair.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct AccessPair {
    pub victim: AccessPattern,
    pub aggressor: AccessPattern,
}

impl AccessPair {
    pub const fn new(victim: AccessPattern, aggressor: AccessPattern) -> Self {
        Self { victim, aggressor }
    }

    pub fn label(&self) -> String {
        format!("{}_{}", self.victim, self.aggressor)
    }
}

impl fmt::Display for AccessPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.victim, self.aggressor)
    }
}

impl FromStr for AccessPair {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (v, a) = s
            .split_once(['_', ','])
            .ok_or_else(|| invalid("access pair", s))?;
        Ok(Self::new(v.parse()?, a.parse()?))
    }
}

impl TryFrom<String> for AccessPair {
    type Error = SweepError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ---------------------------------------------------------------------------
// NUMA NODES AND BINDINGS
// ---------------------------------------------------------------------------

/// A NUMA node id, or the study's baseline node.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Node {
    Baseline,
    Id(u32),
}

impl Node {
    pub fn resolve(self, baseline: u32) -> u32 {
        match self {
            Self::Baseline => baseline,
            Self::Id(id) => id,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Baseline => f.write_str("base"),
            Self::Id(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for Node {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "base" {
            return Ok(Self::Baseline);
        }
        s.parse::<u32>().map(Self::Id).map_err(|_| invalid("numa node", s))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct NodeBinding {
    pub victim: Node,
    pub aggressor: Node,
}

impl NodeBinding {
    pub const fn new(victim: Node, aggressor: Node) -> Self {
        Self { victim, aggressor }
    }

    pub fn descriptor(&self, baseline: u32) -> String {
        format!("{}_{}", self.victim.resolve(baseline), self.aggressor.resolve(baseline))
    }
}

// ---------------------------------------------------------------------------
// THREAD TOPOLOGIES
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum TopologyKind {
    // AGGRESSORS SHARE CORE 0 WITH THE VICTIM
    Intra,
    // AGGRESSORS ON CORES 1..N
    Inter,
}

impl TopologyKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Intra => "intra",
            Self::Inter => "inter",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct ThreadTopology {
    pub kind: TopologyKind,
    pub threads: u32,
}

impl ThreadTopology {
    pub const fn new(kind: TopologyKind, threads: u32) -> Self {
        Self { kind, threads }
    }

    pub fn descriptor(&self) -> String {
        format!("{}_{}", self.kind.label(), self.threads)
    }

    /// Core id for aggressor `i` (1-based; thread 0 is the victim).
    pub fn aggressor_core(&self, i: u32) -> u32 {
        match self.kind {
            TopologyKind::Intra => 0,
            TopologyKind::Inter => i,
        }
    }
}

// ---------------------------------------------------------------------------
// PLACEMENT (SECOND MATRIX AXIS)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Placement {
    Binding(NodeBinding),
    Topology(ThreadTopology),
}

impl Placement {
    pub fn descriptor(&self, baseline: u32) -> String {
        match self {
            Self::Binding(b) => b.descriptor(baseline),
            Self::Topology(t) => t.descriptor(),
        }
    }

    pub fn thread_count(&self) -> u32 {
        match self {
            Self::Binding(_) => 2,
            Self::Topology(t) => t.threads,
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binding(b) => write!(f, "{}_{}", b.victim, b.aggressor),
            Self::Topology(t) => f.write_str(&t.descriptor()),
        }
    }
}

impl FromStr for Placement {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, tail) = s.trim().split_once('_').ok_or_else(|| invalid("placement", s))?;
        let kind = match head {
            "intra" => Some(TopologyKind::Intra),
            "inter" => Some(TopologyKind::Inter),
            _ => None,
        };
        match kind {
            Some(kind) => {
                let threads = tail.parse::<u32>().map_err(|_| invalid("thread count", tail))?;
                Ok(Self::Topology(ThreadTopology::new(kind, threads)))
            }
            None => Ok(Self::Binding(NodeBinding::new(head.parse()?, tail.parse()?))),
        }
    }
}

impl TryFrom<String> for Placement {
    type Error = SweepError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ---------------------------------------------------------------------------
// STRIDES
// ---------------------------------------------------------------------------

/// One sweep position. Victim stride defaults to 1 (one cache line).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Deserialize)]
#[serde(try_from = "StrideLiteral")]
pub struct StridePoint {
    pub victim: Option<u32>,
    pub aggressor: u32,
}

impl StridePoint {
    pub const fn aggressor(stride: u32) -> Self {
        Self { victim: None, aggressor: stride }
    }

    pub const fn pair(victim: u32, aggressor: u32) -> Self {
        Self { victim: Some(victim), aggressor }
    }

    pub fn victim_stride(&self) -> u32 {
        self.victim.unwrap_or(1)
    }

    pub fn is_positive(&self) -> bool {
        self.aggressor > 0 && self.victim_stride() > 0
    }
}

impl fmt::Display for StridePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.victim {
            Some(v) => write!(f, "{}:{}", v, self.aggressor),
            None => write!(f, "{}", self.aggressor),
        }
    }
}

fn stride_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)(?::(\d+))?$").expect("stride pattern"))
}

impl FromStr for StridePoint {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let caps = stride_re().captures(s).ok_or_else(|| invalid("stride", s))?;
        let first = caps[1].parse::<u32>().map_err(|_| invalid("stride", s))?;
        match caps.get(2) {
            Some(m) => {
                let second = m.as_str().parse::<u32>().map_err(|_| invalid("stride", s))?;
                Ok(Self::pair(first, second))
            }
            None => Ok(Self::aggressor(first)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrideLiteral {
    Int(u32),
    Text(String),
}

impl TryFrom<StrideLiteral> for StridePoint {
    type Error = SweepError;

    fn try_from(lit: StrideLiteral) -> Result<Self, Self::Error> {
        match lit {
            StrideLiteral::Int(n) => Ok(Self::aggressor(n)),
            StrideLiteral::Text(s) => s.parse(),
        }
    }
}

/// Parse a comma-separated stride list, e.g. `1,2,4` or `64:64,64:1`.
pub fn parse_sweep(s: &str) -> Result<Vec<StridePoint>, SweepError> {
    s.split(',')
        .filter(|p| !p.trim().is_empty())
        .map(str::parse)
        .collect()
}

// ---------------------------------------------------------------------------
// BUFFER SIZES
// ---------------------------------------------------------------------------

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn mib(n: u64) -> Self {
        Self(n * MIB)
    }
}

// RENDERED IN THE LARGEST SUFFIX THAT DIVIDES EXACTLY, AS THE TOOL PARSES IT
impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.0;
        if n != 0 && n % GIB == 0 {
            write!(f, "{}g", n / GIB)
        } else if n != 0 && n % MIB == 0 {
            write!(f, "{}m", n / MIB)
        } else if n != 0 && n % KIB == 0 {
            write!(f, "{}k", n / KIB)
        } else {
            write!(f, "{}", n)
        }
    }
}

fn size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)([kKmMgG]?)$").expect("size pattern"))
}

impl FromStr for ByteSize {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let caps = size_re().captures(s).ok_or_else(|| invalid("size", s))?;
        let n = caps[1].parse::<u64>().map_err(|_| invalid("size", s))?;
        let mult = match &caps[2] {
            "k" | "K" => KIB,
            "m" | "M" => MIB,
            "g" | "G" => GIB,
            _ => 1,
        };
        n.checked_mul(mult).map(Self).ok_or_else(|| invalid("size", s))
    }
}

impl TryFrom<String> for ByteSize {
    type Error = SweepError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_pair_label_and_parse() {
        let pair: AccessPair = "load_store".parse().unwrap();
        assert_eq!(pair, AccessPair::new(AccessPattern::Load, AccessPattern::Store));
        assert_eq!(pair.label(), "load_store");
        assert_eq!("store,load".parse::<AccessPair>().unwrap().label(), "store_load");
        assert!("load_fetch".parse::<AccessPair>().is_err());
        assert!("load".parse::<AccessPair>().is_err());
    }

    #[test]
    fn placement_parses_bindings_and_topologies() {
        assert_eq!(
            "0_1".parse::<Placement>().unwrap(),
            Placement::Binding(NodeBinding::new(Node::Id(0), Node::Id(1)))
        );
        assert_eq!(
            "base_3".parse::<Placement>().unwrap(),
            Placement::Binding(NodeBinding::new(Node::Baseline, Node::Id(3)))
        );
        assert_eq!(
            "inter_4".parse::<Placement>().unwrap(),
            Placement::Topology(ThreadTopology::new(TopologyKind::Inter, 4))
        );
        assert!("inter_x".parse::<Placement>().is_err());
        assert!("0-1".parse::<Placement>().is_err());
    }

    #[test]
    fn baseline_resolves_in_descriptor() {
        let b = NodeBinding::new(Node::Baseline, Node::Id(1));
        assert_eq!(b.descriptor(0), "0_1");
        assert_eq!(b.descriptor(2), "2_1");
        assert_eq!(Placement::Binding(b).to_string(), "base_1");
    }

    #[test]
    fn topology_core_assignment() {
        let intra = ThreadTopology::new(TopologyKind::Intra, 4);
        let inter = ThreadTopology::new(TopologyKind::Inter, 4);
        let intra_cores: Vec<u32> = (1..4).map(|i| intra.aggressor_core(i)).collect();
        let inter_cores: Vec<u32> = (1..4).map(|i| inter.aggressor_core(i)).collect();
        assert_eq!(intra_cores, vec![0, 0, 0]);
        assert_eq!(inter_cores, vec![1, 2, 3]);
    }

    #[test]
    fn stride_forms() {
        assert_eq!("4".parse::<StridePoint>().unwrap(), StridePoint::aggressor(4));
        assert_eq!("64:1".parse::<StridePoint>().unwrap(), StridePoint::pair(64, 1));
        assert_eq!(StridePoint::aggressor(4).victim_stride(), 1);
        assert_eq!(StridePoint::pair(64, 1).to_string(), "64:1");
        assert!("-2".parse::<StridePoint>().is_err());
        assert!(!StridePoint::aggressor(0).is_positive());
    }

    #[test]
    fn sweep_list_keeps_order() {
        let sweep = parse_sweep("4,1, 2,").unwrap();
        let labels: Vec<String> = sweep.iter().map(|p| p.to_string()).collect();
        assert_eq!(labels, vec!["4", "1", "2"]);
    }

    #[test]
    fn byte_size_suffixes() {
        assert_eq!("32m".parse::<ByteSize>().unwrap(), ByteSize::mib(32));
        assert_eq!("512K".parse::<ByteSize>().unwrap(), ByteSize(512 * 1024));
        assert_eq!(ByteSize::mib(1).to_string(), "1m");
        assert_eq!(ByteSize(2 * GIB).to_string(), "2g");
        assert_eq!(ByteSize(1536 * KIB).to_string(), "1536k");
        assert_eq!(ByteSize(100).to_string(), "100");
        assert!("1.5m".parse::<ByteSize>().is_err());
    }
}

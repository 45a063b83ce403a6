// PCHASE-SWEEP EXPERIMENT MATRIX
// ONE STUDY = ACCESS PAIRS x PLACEMENTS x STRIDE SWEEP
//
// ENUMERATION ORDER IS FIXED: ACCESS PAIR (OUTER), PLACEMENT, STRIDE (INNER).
// EACH (ACCESS PAIR, PLACEMENT) COMBINATION OWNS ONE OUTPUT ARTIFACT AND ITS
// ROWS APPEAR IN STRIDE ORDER. PURE: NOTHING HERE TOUCHES THE FILESYSTEM.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::error::{Result, SweepError};
use crate::pattern::{AccessPair, ByteSize, Placement, StridePoint};

pub const DEFAULT_DURATION_SECS: f64 = 3.0;
pub const COMBINED_PREFIX: &str = "reformat";

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateMode {
    /// Last two fields (latency, bandwidth) per stride, one row each.
    Pivot,
    /// Every run's stdout verbatim, framed by marker lines.
    Raw,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLayout {
    /// `<access>-<placement>-<stub>` per combination.
    #[default]
    PerCombination,
    /// Everything in `reformat-<stub>`, blank-line separated.
    Combined,
}

fn default_duration() -> f64 {
    DEFAULT_DURATION_SECS
}

/// A complete study definition. The built-in presets and TOML study files
/// both produce one of these.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Study {
    pub name: String,
    pub access: Vec<AccessPair>,
    pub placements: Vec<Placement>,
    pub strides: Vec<StridePoint>,
    // NODE FOR EVERY THREAD OF A TOPOLOGY PLACEMENT
    #[serde(default)]
    pub node: u32,
    // WHAT Node::Baseline RESOLVES TO IN BINDING PLACEMENTS
    #[serde(default)]
    pub baseline_node: u32,
    pub victim_size: ByteSize,
    pub aggressor_size: ByteSize,
    #[serde(default = "default_duration")]
    pub duration_secs: f64,
    pub mode: AggregateMode,
    // ONE `-o hdr` INVOCATION PER COMBINATION (RAW MODE ONLY)
    #[serde(default)]
    pub header: bool,
    #[serde(default)]
    pub layout: OutputLayout,
}

/// One (access pair, placement) cell of the outer loops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Combination {
    pub access: AccessPair,
    pub placement: Placement,
    pub descriptor: String,
}

impl Combination {
    pub fn key(&self) -> String {
        format!("{}-{}", self.access, self.descriptor)
    }

    pub fn artifact_name(&self, stub: &str) -> String {
        format!("{}-{}", self.key(), stub)
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Everything needed to build one RunConfig.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatrixPoint {
    pub combination: Combination,
    pub stride: StridePoint,
    // POSITION WITHIN THE STRIDE SWEEP
    pub index: usize,
}

impl fmt::Display for MatrixPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stride {}", self.combination, self.stride)
    }
}

impl Study {
    pub fn from_toml(text: &str) -> Result<Self> {
        let study: Study =
            toml::from_str(text).map_err(|e| SweepError::InvalidStudy(e.to_string()))?;
        study.validate()?;
        Ok(study)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| -> Result<()> {
            Err(SweepError::InvalidStudy(format!("{}: {}", self.name, msg)))
        };

        if self.access.is_empty() {
            return bad("no access pairs".to_string());
        }
        if self.placements.is_empty() {
            return bad("no placements".to_string());
        }
        if self.strides.is_empty() {
            return bad("empty stride sweep".to_string());
        }
        if let Some(p) = self.strides.iter().find(|p| !p.is_positive()) {
            return bad(format!("stride {} is not positive", p));
        }
        for p in &self.placements {
            if let Placement::Topology(t) = p {
                if t.threads < 2 {
                    return bad(format!("{} needs at least 2 threads", t.descriptor()));
                }
            }
        }
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return bad(format!("duration {} is not positive", self.duration_secs));
        }
        if self.victim_size.0 == 0 || self.aggressor_size.0 == 0 {
            return bad("buffer sizes must be non-zero".to_string());
        }
        if self.header && self.mode == AggregateMode::Pivot {
            return bad("header invocation only applies to raw mode".to_string());
        }

        // ONE ARTIFACT PER COMBINATION: TWO COMBINATIONS RESOLVING TO THE SAME
        // FILE NAME WOULD OVERWRITE EACH OTHER
        if self.layout == OutputLayout::PerCombination {
            let mut seen: HashMap<String, usize> = HashMap::new();
            for (i, c) in self.combinations().iter().enumerate() {
                if let Some(prev) = seen.insert(c.key(), i) {
                    return bad(format!(
                        "combinations {} and {} both write {} (use the combined layout)",
                        prev,
                        i,
                        c.key()
                    ));
                }
            }
        }
        Ok(())
    }

    /// Outer loops, in output order.
    pub fn combinations(&self) -> Vec<Combination> {
        self.access
            .iter()
            .flat_map(|&access| {
                self.placements.iter().map(move |&placement| Combination {
                    access,
                    placement,
                    descriptor: placement.descriptor(self.baseline_node),
                })
            })
            .collect()
    }

    /// Every matrix point in invocation order. The combinations are built up
    /// front; only the stride points are produced on demand.
    pub fn points(&self) -> impl Iterator<Item = MatrixPoint> + '_ {
        self.combinations().into_iter().flat_map(move |c| self.points_for(c))
    }

    /// The stride sweep for one combination.
    pub fn points_for(&self, combination: Combination) -> impl Iterator<Item = MatrixPoint> + '_ {
        self.strides.iter().enumerate().map(move |(index, &stride)| MatrixPoint {
            combination: combination.clone(),
            stride,
            index,
        })
    }

    pub fn invocation_count(&self) -> usize {
        let combos = self.access.len() * self.placements.len();
        let headers = if self.header { combos } else { 0 };
        combos * self.strides.len() + headers
    }

    pub fn combined_name(stub: &str) -> String {
        format!("{}-{}", COMBINED_PREFIX, stub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{AccessPattern, Node, NodeBinding, ThreadTopology, TopologyKind};

    fn study() -> Study {
        Study {
            name: "unit".to_string(),
            access: vec![
                AccessPair::new(AccessPattern::Load, AccessPattern::Store),
                AccessPair::new(AccessPattern::Store, AccessPattern::Store),
            ],
            placements: vec![
                Placement::Binding(NodeBinding::new(Node::Id(0), Node::Id(1))),
                Placement::Topology(ThreadTopology::new(TopologyKind::Inter, 4)),
            ],
            strides: vec![StridePoint::aggressor(1), StridePoint::aggressor(2), StridePoint::aggressor(4)],
            node: 1,
            baseline_node: 0,
            victim_size: ByteSize::mib(1),
            aggressor_size: ByteSize::mib(2),
            duration_secs: DEFAULT_DURATION_SECS,
            mode: AggregateMode::Pivot,
            header: false,
            layout: OutputLayout::PerCombination,
        }
    }

    #[test]
    fn nested_order_access_then_placement_then_stride() {
        let s = study();
        let labels: Vec<String> = s.points().map(|p| p.to_string()).collect();
        assert_eq!(labels.len(), 12);
        assert_eq!(labels[0], "load_store-0_1 stride 1");
        assert_eq!(labels[2], "load_store-0_1 stride 4");
        assert_eq!(labels[3], "load_store-inter_4 stride 1");
        assert_eq!(labels[6], "store_store-0_1 stride 1");
        assert_eq!(labels[11], "store_store-inter_4 stride 4");
    }

    #[test]
    fn enumeration_is_reproducible() {
        let s = study();
        let a: Vec<MatrixPoint> = s.points().collect();
        let b: Vec<MatrixPoint> = s.points().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn sweep_index_restarts_per_combination() {
        let s = study();
        let idx: Vec<usize> = s.points().map(|p| p.index).collect();
        assert_eq!(idx, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn invocation_count_with_and_without_header() {
        let mut s = study();
        assert_eq!(s.invocation_count(), 2 * 2 * 3);
        s.mode = AggregateMode::Raw;
        s.header = true;
        assert_eq!(s.invocation_count(), 2 * 2 * 3 + 2 * 2);
    }

    #[test]
    fn artifact_names() {
        let combos = study().combinations();
        let names: Vec<String> = combos.iter().map(|c| c.artifact_name("run1")).collect();
        assert_eq!(
            names,
            vec![
                "load_store-0_1-run1",
                "load_store-inter_4-run1",
                "store_store-0_1-run1",
                "store_store-inter_4-run1",
            ]
        );
        assert_eq!(Study::combined_name("run1"), "reformat-run1");
    }

    #[test]
    fn rejects_colliding_artifacts() {
        let mut s = study();
        // BASELINE RESOLVES TO 0, SO base_1 AND 0_1 NAME THE SAME FILE
        s.placements.push(Placement::Binding(NodeBinding::new(Node::Baseline, Node::Id(1))));
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("load_store-0_1"));

        s.layout = OutputLayout::Combined;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_studies() {
        let mut s = study();
        s.strides.clear();
        assert!(s.validate().is_err());

        let mut s = study();
        s.strides.push(StridePoint::aggressor(0));
        assert!(s.validate().is_err());

        let mut s = study();
        s.placements = vec![Placement::Topology(ThreadTopology::new(TopologyKind::Intra, 1))];
        assert!(s.validate().is_err());

        let mut s = study();
        s.duration_secs = 0.0;
        assert!(s.validate().is_err());

        let mut s = study();
        s.header = true;
        assert!(s.validate().is_err());
    }

    #[test]
    fn study_from_toml() {
        let text = r#"
            name = "custom"
            access = ["load_store", "store_load"]
            placements = ["0_1", "base_2", "inter_4"]
            strides = [1, 2, "64:1"]
            node = 1
            victim_size = "1m"
            aggressor_size = "32m"
            duration_secs = 1.5
            mode = "raw"
            header = true
        "#;
        let s = Study::from_toml(text).unwrap();
        assert_eq!(s.access.len(), 2);
        assert_eq!(s.placements[2], Placement::Topology(ThreadTopology::new(TopologyKind::Inter, 4)));
        assert_eq!(s.strides[2], StridePoint::pair(64, 1));
        assert_eq!(s.aggressor_size, ByteSize::mib(32));
        assert_eq!(s.layout, OutputLayout::PerCombination);
        assert_eq!(s.invocation_count(), 2 * 3 * 3 + 2 * 3);
    }

    #[test]
    fn study_from_toml_rejects_unknown_keys() {
        let text = r#"
            name = "typo"
            access = ["load_load"]
            placements = ["0_0"]
            strides = [1]
            victim_size = "1m"
            aggressor_size = "1m"
            mode = "pivot"
            strdes = [2]
        "#;
        assert!(matches!(Study::from_toml(text), Err(SweepError::InvalidStudy(_))));
    }
}

// PCHASE-SWEEP HOST TOPOLOGY
// READS NUMA NODE AND CPU RANGES FROM SYSFS. PLACEMENT ITSELF IS THE
// BENCHMARK'S JOB; THIS ONLY FLAGS STUDIES THAT NAME NODES OR CORES THE HOST
// DOESN'T HAVE, BEFORE MINUTES OF SWEEP TIME ARE SPENT ON THEM.

use std::fs;

use tracing::warn;

use crate::config::RunConfig;
use crate::matrix::Study;

pub const NODE_ONLINE: &str = "/sys/devices/system/node/online";
pub const CPU_ONLINE: &str = "/sys/devices/system/cpu/online";

// PARSE A KERNEL RANGE LIST ("0-3,8,10-11") INTO IDS
pub fn parse_range_list(raw: &str) -> Vec<u32> {
    let mut ids = Vec::new();
    for range in raw.trim().split(',') {
        let parts: Vec<&str> = range.split('-').collect();
        match parts.len() {
            1 => {
                if let Ok(id) = parts[0].trim().parse::<u32>() {
                    ids.push(id);
                }
            }
            2 => {
                if let (Ok(lo), Ok(hi)) = (parts[0].trim().parse::<u32>(), parts[1].trim().parse::<u32>()) {
                    ids.extend(lo..=hi);
                }
            }
            _ => {}
        }
    }
    ids
}

fn read_range_list(path: &str) -> Option<Vec<u32>> {
    fs::read_to_string(path).ok().map(|raw| parse_range_list(&raw))
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostTopology {
    // None WHEN SYSFS DOESN'T EXPOSE IT (NON-NUMA KERNEL, CONTAINER)
    pub nodes: Option<Vec<u32>>,
    pub cpus: Option<Vec<u32>>,
}

impl HostTopology {
    pub fn detect() -> Self {
        Self {
            nodes: read_range_list(NODE_ONLINE),
            cpus: read_range_list(CPU_ONLINE),
        }
    }

    /// Human-readable problems with running `study` on this host.
    pub fn findings(&self, study: &Study) -> Vec<String> {
        let mut nodes_used: Vec<u32> = Vec::new();
        let mut max_core = 0u32;
        for point in study.points() {
            let cfg = RunConfig::for_point(study, &point);
            for t in &cfg.threads {
                if !nodes_used.contains(&t.node) {
                    nodes_used.push(t.node);
                }
                max_core = max_core.max(t.core);
            }
        }
        nodes_used.sort_unstable();

        let mut out = Vec::new();
        if let Some(nodes) = &self.nodes {
            for n in nodes_used.iter().filter(|n| !nodes.contains(n)) {
                out.push(format!("numa node {} is not online (online: {:?})", n, nodes));
            }
        }
        if let Some(cpus) = &self.cpus {
            if !cpus.contains(&max_core) {
                out.push(format!("core {} is not online ({} cpus online)", max_core, cpus.len()));
            }
        }
        out
    }

    // PREFLIGHT: WARN ONLY. THE BENCHMARK HAS THE FINAL SAY ON PLACEMENT.
    pub fn preflight(&self, study: &Study) {
        for finding in self.findings(study) {
            warn!(study = %study.name, "{}", finding);
        }
    }
}

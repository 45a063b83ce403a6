use std::io::Read;
use std::path::Path;

use anyhow::Result;

use pchase_sweep::invoke::{BenchmarkInvoker, Invoke};
use pchase_sweep::topology::{HostTopology, CPU_ONLINE, NODE_ONLINE};

fn check_kernel_config() -> bool {
    let file = match std::fs::File::open("/proc/config.gz") {
        Ok(f) => f,
        Err(_) => {
            println!("  /proc/config.gz       NOT FOUND (SKIPPED)");
            return true;
        }
    };
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut config = String::new();
    if decoder.read_to_string(&mut config).is_err() {
        println!("  /proc/config.gz       UNREADABLE (SKIPPED)");
        return true;
    }
    let found = config.lines().any(|l| l.trim() == "CONFIG_NUMA=y");
    if found {
        println!("  CONFIG_NUMA           OK");
    } else {
        println!("  CONFIG_NUMA           NOT SET -- node placement will be ignored");
    }
    found
}

fn check_benchmark(pchase: &Path) -> bool {
    let mut invoker = match BenchmarkInvoker::new(pchase) {
        Ok(inv) => inv,
        Err(e) => {
            println!("  {:<22}MISSING ({})", pchase.display(), e);
            return false;
        }
    };
    println!("  {:<22}{}", "binary", invoker.binary().display());

    // ONE HEADER RUN PROVES IT EXECUTES AND SPEAKS CSV
    match invoker.header() {
        Ok(hdr) => {
            let columns = hdr.as_str().lines().next().map(|l| l.split(',').count()).unwrap_or(0);
            println!("  {:<22}OK ({} columns)", "header probe", columns);
            true
        }
        Err(e) => {
            println!("  {:<22}FAILED ({})", "header probe", e);
            false
        }
    }
}

fn show_ids(label: &str, path: &str, ids: &Option<Vec<u32>>) -> bool {
    match ids {
        Some(ids) if !ids.is_empty() => {
            println!("  {:<22}{} ONLINE {:?}", label, ids.len(), ids);
            true
        }
        _ => {
            println!("  {:<22}UNKNOWN ({} unreadable)", label, path);
            false
        }
    }
}

pub fn run_check(pchase: &Path) -> Result<()> {
    println!("PCHASE-SWEEP DEPENDENCY CHECK");
    println!();

    let mut ok = true;

    println!("BENCHMARK:");
    if !check_benchmark(pchase) {
        ok = false;
    }
    println!();

    println!("TOPOLOGY:");
    let host = HostTopology::detect();
    if !show_ids("numa nodes", NODE_ONLINE, &host.nodes) {
        ok = false;
    }
    if !show_ids("cpus", CPU_ONLINE, &host.cpus) {
        ok = false;
    }
    if host.nodes.as_ref().map(|n| n.len() < 2).unwrap_or(false) {
        println!("  SINGLE NUMA NODE -- cross-node placements collapse onto node 0");
    }
    println!();

    println!("KERNEL CONFIG:");
    if !check_kernel_config() {
        ok = false;
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        std::process::exit(1);
    }

    Ok(())
}

//! System metrics sampling for worker nodes.
//!
//! Reports global CPU and memory usage plus the process count, every few
//! seconds. Uptime counts from agent start, not machine boot, so a
//! restarted worker is visibly "young" on the dashboard.

use peregrine_proto::MetricsReport;
use std::time::Instant;
use sysinfo::System;

pub struct MetricsSampler {
    sys: System,
    started: Instant,
}

impl MetricsSampler {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        Self { sys, started: Instant::now() }
    }

    /// Successive samples are needed for a meaningful CPU figure; the
    /// first one after startup may read 0.
    pub fn sample(&mut self, node_id: &str) -> MetricsReport {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();
        self.sys.refresh_processes();

        let cpu = self.sys.global_cpu_info().cpu_usage() as f64;
        let total = self.sys.total_memory();
        let memory = if total > 0 {
            (self.sys.used_memory() as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            node_id: node_id.to_string(),
            cpu,
            memory,
            processes: self.sys.processes().len() as u32,
            uptime: self.started.elapsed().as_millis() as u64,
        }
    }
}

impl Default for MetricsSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_reports_plausible_values() {
        let mut sampler = MetricsSampler::new();
        let report = sampler.sample("node-1");
        assert_eq!(report.node_id, "node-1");
        assert!(report.cpu >= 0.0);
        assert!((0.0..=100.0).contains(&report.memory));
        assert!(report.processes > 0);
    }
}

use sysinfo::{Pid, System};

/// A point-in-time resource reading for the worker supervisor's owning OS
/// process.
///
/// Per the redesign note on resource caps: since a Strategy Worker is a
/// supervised `tokio::task` rather than a real OS process, there is no
/// per-worker process to sample. Every worker's resource accounting is
/// therefore against the one binary's PID — a faithful redesign of the
/// original's per-subprocess `psutil` sampling, not a literal translation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceUsage {
    pub memory_mb: f64,
    pub cpu_percent: f64,
}

/// Thin wrapper around `sysinfo::System`, refreshed on demand.
pub struct ResourceSampler {
    system: System,
    pid: Pid,
}

impl ResourceSampler {
    pub fn new() -> Self {
        let pid = Pid::from_u32(std::process::id());
        let mut system = System::new();
        system.refresh_process(pid);
        Self { system, pid }
    }

    /// Refreshes and returns the current reading. `sysinfo` needs two
    /// samples spaced apart to report meaningful CPU usage, so the very
    /// first call after construction reads as `0.0`.
    pub fn sample(&mut self) -> ResourceUsage {
        self.system.refresh_process(self.pid);
        match self.system.process(self.pid) {
            Some(process) => ResourceUsage {
                memory_mb: process.memory() as f64 / (1024.0 * 1024.0),
                cpu_percent: process.cpu_usage() as f64,
            },
            None => ResourceUsage::default(),
        }
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

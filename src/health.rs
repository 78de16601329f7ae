//! System Health Monitor
//!
//! Samples host CPU and memory usage and combines them with the
//! orchestrator's live counters into a [`SystemTelemetry`] snapshot. CPU
//! usage is a delta over `/proc/stat` between consecutive samples; memory
//! comes straight from the kernel via `sysinfo(2)`. Sampling failures fall
//! back to zeroed readings rather than failing the health surface.

use crate::config::defaults::{TELEMETRY_DEGRADED_PERCENT, TELEMETRY_UNHEALTHY_PERCENT};
use crate::types::{HealthStatus, SystemTelemetry};
use chrono::Utc;
use std::sync::Mutex;
use tracing::warn;

/// Aggregate counters from one `/proc/stat` cpu line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuSample {
    busy: u64,
    total: u64,
}

pub struct HealthMonitor {
    previous_cpu: Mutex<Option<CpuSample>>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            previous_cpu: Mutex::new(None),
        }
    }

    /// Take a telemetry sample, folding in the caller's live job counters.
    pub fn sample(&self, active_jobs: usize, queue_depth: usize) -> SystemTelemetry {
        SystemTelemetry {
            cpu_usage: self.cpu_usage_percent(),
            memory_usage: memory_usage_percent().unwrap_or_else(|e| {
                warn!("Memory sampling failed: {e}");
                0.0
            }),
            active_jobs,
            queue_depth,
            timestamp: Utc::now(),
        }
    }

    /// Classify a telemetry sample against the resource thresholds.
    pub fn classify(telemetry: &SystemTelemetry) -> HealthStatus {
        let peak = telemetry.cpu_usage.max(telemetry.memory_usage);
        if peak >= TELEMETRY_UNHEALTHY_PERCENT {
            HealthStatus::Unhealthy
        } else if peak >= TELEMETRY_DEGRADED_PERCENT {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// CPU busy percent since the previous sample (0.0 on the first call
    /// or when `/proc/stat` is unreadable).
    fn cpu_usage_percent(&self) -> f64 {
        let current = match read_cpu_sample() {
            Ok(sample) => sample,
            Err(e) => {
                warn!("CPU sampling failed: {e}");
                return 0.0;
            }
        };

        let Ok(mut guard) = self.previous_cpu.lock() else {
            return 0.0;
        };
        let previous = guard.replace(current);

        match previous {
            Some(prev) if current.total > prev.total => {
                let busy = current.busy.saturating_sub(prev.busy) as f64;
                let total = (current.total - prev.total) as f64;
                (busy / total * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        }
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
fn read_cpu_sample() -> Result<CpuSample, String> {
    let stat = std::fs::read_to_string("/proc/stat")
        .map_err(|e| format!("reading /proc/stat: {e}"))?;
    let line = stat
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| "no aggregate cpu line in /proc/stat".to_string())?;

    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        return Err(format!("short cpu line: {line}"));
    }

    // user nice system idle iowait irq softirq ...
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    let total: u64 = fields.iter().sum();
    Ok(CpuSample {
        busy: total.saturating_sub(idle),
        total,
    })
}

/// Memory usage percent via `sysinfo(2)`.
fn memory_usage_percent() -> Result<f64, String> {
    use std::mem::MaybeUninit;

    let mut info = MaybeUninit::<libc::sysinfo>::uninit();
    let result = unsafe { libc::sysinfo(info.as_mut_ptr()) };
    if result != 0 {
        return Err("sysinfo syscall failed".to_string());
    }
    let info = unsafe { info.assume_init() };

    let unit = u64::from(info.mem_unit.max(1));
    let total = (info.totalram as u64) * unit;
    if total == 0 {
        return Err("sysinfo reported zero total memory".to_string());
    }
    let used = total.saturating_sub((info.freeram as u64) * unit);
    Ok((used as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
}

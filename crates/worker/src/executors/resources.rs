//! Host resource probe for the script runner's admission gate.
//!
//! Linux /proc readers: CPU pressure as 1-minute load average over core
//! count, memory as used over total. Percentages, 0-100-ish (load can
//! legitimately exceed the core count).

use courier_errors::{CourierError, CourierResult};

#[derive(Debug, Clone, Copy)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl ResourceUsage {
    pub fn exceeds(&self, cpu_threshold: f64, memory_threshold: f64) -> bool {
        self.cpu_percent > cpu_threshold || self.memory_percent > memory_threshold
    }
}

pub async fn current_usage() -> CourierResult<ResourceUsage> {
    let loadavg = tokio::fs::read_to_string("/proc/loadavg")
        .await
        .map_err(|e| CourierError::internal(format!("cannot read /proc/loadavg: {e}")))?;
    let meminfo = tokio::fs::read_to_string("/proc/meminfo")
        .await
        .map_err(|e| CourierError::internal(format!("cannot read /proc/meminfo: {e}")))?;

    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let load = parse_loadavg(&loadavg)
        .ok_or_else(|| CourierError::internal("malformed /proc/loadavg"))?;
    let memory_percent = parse_memory_percent(&meminfo)
        .ok_or_else(|| CourierError::internal("malformed /proc/meminfo"))?;

    Ok(ResourceUsage {
        cpu_percent: load / cores as f64 * 100.0,
        memory_percent,
    })
}

fn parse_loadavg(raw: &str) -> Option<f64> {
    raw.split_whitespace().next()?.parse().ok()
}

fn parse_memory_percent(raw: &str) -> Option<f64> {
    let mut total_kb = None;
    let mut available_kb = None;

    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = first_number(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = first_number(rest);
        }
        if total_kb.is_some() && available_kb.is_some() {
            break;
        }
    }

    let total = total_kb?;
    let available = available_kb?;
    if total <= 0.0 {
        return None;
    }
    Some((total - available) / total * 100.0)
}

fn first_number(rest: &str) -> Option<f64> {
    rest.split_whitespace().next()?.parse().ok()
}

// ABOUTME: Resource statistics derived from a single daemon stats snapshot

use crate::docker::RuntimeError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const BYTES_PER_MB: f64 = 1_048_576.0;

/// CPU counters from one sampling point of the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuCounters {
    pub total_usage: u64,
    pub system_usage: Option<u64>,
    pub online_cpus: Option<u64>,
    pub per_cpu_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Raw counters of one non-streaming stats response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cpu: CpuCounters,
    /// Previous sample the daemon keeps for the same container
    pub precpu: CpuCounters,
    pub memory_usage: Option<u64>,
    pub memory_limit: Option<u64>,
    pub networks: HashMap<String, InterfaceCounters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    #[serde(rename = "containerID")]
    pub container_id: String,
    pub interface: String,
    pub cpu_percent: f64,
    pub memory_usage_mb: f64,
    pub memory_limit_mb: f64,
    pub network_rx_mb: f64,
    pub network_tx_mb: f64,
}

/// Human formatted stats, in the shape dashboards consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    #[serde(rename = "containerID")]
    pub container_id: String,
    pub cpu: String,
    pub memory: String,
    pub network_rx: String,
    pub network_tx: String,
}

impl ContainerStats {
    pub fn from_snapshot(
        container_id: &str,
        snapshot: &StatsSnapshot,
        interface: &str,
    ) -> Result<Self, RuntimeError> {
        let counters = snapshot.networks.get(interface).ok_or_else(|| {
            RuntimeError::MissingInterface {
                id: container_id.to_string(),
                interface: interface.to_string(),
            }
        })?;

        Ok(Self {
            container_id: container_id.to_string(),
            interface: interface.to_string(),
            cpu_percent: cpu_percent(&snapshot.cpu, &snapshot.precpu),
            memory_usage_mb: to_mb(snapshot.memory_usage.unwrap_or_default()),
            memory_limit_mb: to_mb(snapshot.memory_limit.unwrap_or_default()),
            network_rx_mb: to_mb(counters.rx_bytes),
            network_tx_mb: to_mb(counters.tx_bytes),
        })
    }

    pub fn view(&self) -> StatsView {
        StatsView {
            container_id: self.container_id.clone(),
            cpu: format!("{:.2}%", self.cpu_percent),
            memory: format!("{:.2} / {:.2} MB", self.memory_usage_mb, self.memory_limit_mb),
            network_rx: format!("{:.2} MB", self.network_rx_mb),
            network_tx: format!("{:.2} MB", self.network_tx_mb),
        }
    }
}

/// Usage over the daemon's own sampling window, scaled by the number of cores.
///
/// Always finite: an empty or negative system window reads as idle.
pub fn cpu_percent(current: &CpuCounters, previous: &CpuCounters) -> f64 {
    let (Some(system), Some(previous_system)) = (current.system_usage, previous.system_usage)
    else {
        return 0.0;
    };

    if system <= previous_system || current.total_usage < previous.total_usage {
        return 0.0;
    }

    let cpu_delta = (current.total_usage - previous.total_usage) as f64;
    let system_delta = (system - previous_system) as f64;
    let cores = current
        .online_cpus
        .filter(|n| *n > 0)
        .unwrap_or(current.per_cpu_count.max(1) as u64) as f64;

    // A container cannot use more than every core for the whole window
    (cpu_delta / system_delta * cores * 100.0).clamp(0.0, cores * 100.0)
}

fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

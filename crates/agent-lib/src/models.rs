//! Typed readings pulled from kernel data sources
//!
//! Sources decode text into these structs once per collection cycle; the
//! engine only ever consumes decoded numbers.

use serde::{Deserialize, Serialize};

/// Cumulative CPU time from the aggregated `cpu` line of `/proc/stat`, in ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

/// Load averages scaled by 100 (1.25 is stored as 125)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub load1: i64,
    pub load5: i64,
    pub load15: i64,
}

/// Memory figures from `/proc/meminfo`, in kB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemInfo {
    pub total_kb: u64,
    pub available_kb: u64,
    pub dirty_kb: u64,
    pub swap_total_kb: u64,
    pub swap_free_kb: u64,
}

/// Per-device I/O counters from `/proc/diskstats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskStats {
    pub major: u32,
    pub minor: u32,
    pub name: String,
    pub reads: u64,
    pub read_ms: u64,
    pub writes: u64,
    pub write_ms: u64,
}

/// Per-interface byte counters from `/proc/net/dev`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetStats {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One mounted filesystem from `/proc/self/mountinfo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    pub device: String,
    pub mount: String,
    pub fs: String,
}

/// Capacity of one mounted filesystem, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsUsage {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

/// Sensor readings in millidegrees Celsius.
///
/// `None` means the sensor does not exist on this host; a sensor that exists
/// but cannot be read reports `Some(0)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Temperatures {
    pub cpu: Option<i64>,
    pub gpu: Option<i64>,
}

//! Host metrics collection
//!
//! This module reads kernel resource counters from procfs and sysfs and
//! feeds them into the engine on each family's cadence.

mod hwmon;
mod r#loop;
mod procfs;


pub use hwmon::{HwmonSensors, SensorKind};
pub use procfs::ProcfsSource;
pub use r#loop::{CollectionConfig, CollectionLoop, CollectionLoopBuilder, CycleReport};

use crate::error::SourceError;
use crate::models::{
    CpuTimes, DiskStats, FsUsage, LoadAverage, MemInfo, MountEntry, NetStats, Temperatures,
};
use std::path::Path;
use std::sync::Arc;

pub use async_trait::async_trait;

/// One pull of typed readings from the host
///
/// Each call performs a fresh read. A reading that cannot be obtained is a
/// [`SourceError`]; the caller decides what to record instead.
#[async_trait]
pub trait HostSource: Send + Sync {
    /// Aggregated CPU time over all processors.
    async fn cpu_times(&self) -> Result<CpuTimes, SourceError>;

    async fn load_average(&self) -> Result<LoadAverage, SourceError>;

    async fn memory(&self) -> Result<MemInfo, SourceError>;

    /// Counters of every block device the kernel lists.
    async fn disk_stats(&self) -> Result<Vec<DiskStats>, SourceError>;

    /// Counters of every network interface, loopback included.
    async fn net_stats(&self) -> Result<Vec<NetStats>, SourceError>;

    async fn mounts(&self) -> Result<Vec<MountEntry>, SourceError>;

    /// Capacity of the filesystem mounted at `mount`.
    async fn fs_usage(&self, mount: &str) -> Result<FsUsage, SourceError>;

    async fn temperatures(&self) -> Result<Temperatures, SourceError>;
}

/// Source reading the live kernel interfaces under the given roots.
pub fn create_source(proc_root: &Path, sys_root: &Path) -> Arc<dyn HostSource> {
    tracing::info!(
        proc_root = %proc_root.display(),
        sys_root = %sys_root.display(),
        "Reading host metrics from procfs and sysfs"
    );
    Arc::new(ProcfsSource::with_roots(proc_root, sys_root))
}

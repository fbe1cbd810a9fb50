//! Host readings from procfs, statvfs and hwmon
//!
//! Reads:
//! - /proc/stat and /proc/loadavg for CPU
//! - /proc/meminfo for memory
//! - /proc/diskstats and /proc/net/dev for I/O counters
//! - /proc/self/mountinfo and statvfs for storage capacity

use super::hwmon::HwmonSensors;
use super::HostSource;
use crate::error::SourceError;
use crate::models::{
    CpuTimes, DiskStats, FsUsage, LoadAverage, MemInfo, MountEntry, NetStats, Temperatures,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::OnceCell;

/// Source over a procfs and a sysfs mount point
pub struct ProcfsSource {
    proc_root: PathBuf,
    sys_root: PathBuf,
    sensors: OnceCell<HwmonSensors>,
}

impl Default for ProcfsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcfsSource {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys")
    }

    /// Source over alternate roots (containers mounting the host's /proc
    /// elsewhere, or test fixtures)
    pub fn with_roots(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
            sensors: OnceCell::new(),
        }
    }

    async fn read(&self, relative: &str) -> Result<(PathBuf, String), SourceError> {
        let path = self.proc_root.join(relative);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok((path, content)),
            Err(source) => Err(SourceError::Unavailable { path, source }),
        }
    }

    /// Parses the aggregated `cpu` line of `/proc/stat`.
    ///
    /// Kernels older than 2.6.11 lack the steal column; missing trailing
    /// columns read as zero.
    pub fn parse_cpu_stat(content: &str) -> Option<CpuTimes> {
        let line = content
            .lines()
            .find(|line| line.split_whitespace().next() == Some("cpu"))?;
        let mut fields = line
            .split_whitespace()
            .skip(1)
            .map(|field| field.parse::<u64>());

        let mut values = [0u64; 8];
        let mut parsed = 0;
        for value in values.iter_mut() {
            match fields.next() {
                Some(Ok(v)) => {
                    *value = v;
                    parsed += 1;
                }
                Some(Err(_)) => return None,
                None => break,
            }
        }
        if parsed < 4 {
            return None;
        }

        let [user, nice, system, idle, iowait, irq, softirq, steal] = values;
        Some(CpuTimes {
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
        })
    }

    /// Parses `/proc/loadavg` into hundredths.
    pub fn parse_loadavg(content: &str) -> Option<LoadAverage> {
        let mut fields = content.split_whitespace().map(centi);
        Some(LoadAverage {
            load1: fields.next()??,
            load5: fields.next()??,
            load15: fields.next()??,
        })
    }

    /// Parses `/proc/meminfo`. `MemTotal` is required; every other field
    /// reads as zero when absent.
    pub fn parse_meminfo(content: &str) -> Option<MemInfo> {
        let mut info = MemInfo::default();
        let mut has_total = false;

        for line in content.lines() {
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let Some(Ok(value)) = rest.split_whitespace().next().map(str::parse::<u64>) else {
                continue;
            };
            match key {
                "MemTotal" => {
                    info.total_kb = value;
                    has_total = true;
                }
                "MemAvailable" => info.available_kb = value,
                "Dirty" => info.dirty_kb = value,
                "SwapTotal" => info.swap_total_kb = value,
                "SwapFree" => info.swap_free_kb = value,
                _ => {}
            }
        }
        has_total.then_some(info)
    }

    /// Parses `/proc/diskstats`, skipping malformed lines.
    pub fn parse_diskstats(content: &str) -> Vec<DiskStats> {
        content
            .lines()
            .filter_map(|line| {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < 11 {
                    return None;
                }
                let number = |i: usize| fields[i].parse::<u64>().ok();
                Some(DiskStats {
                    major: fields[0].parse().ok()?,
                    minor: fields[1].parse().ok()?,
                    name: fields[2].to_string(),
                    reads: number(3)?,
                    read_ms: number(6)?,
                    writes: number(7)?,
                    write_ms: number(10)?,
                })
            })
            .collect()
    }

    /// Parses `/proc/net/dev`, skipping the two header lines and malformed
    /// lines.
    pub fn parse_net_dev(content: &str) -> Vec<NetStats> {
        content
            .lines()
            .skip(2)
            .filter_map(|line| {
                let (name, counters) = line.split_once(':')?;
                let fields: Vec<&str> = counters.split_whitespace().collect();
                if fields.len() < 9 {
                    return None;
                }
                Some(NetStats {
                    name: name.trim().to_string(),
                    rx_bytes: fields[0].parse().ok()?,
                    tx_bytes: fields[8].parse().ok()?,
                })
            })
            .collect()
    }

    /// Parses `/proc/self/mountinfo`, decoding octal escapes in paths.
    pub fn parse_mountinfo(content: &str) -> Vec<MountEntry> {
        content
            .lines()
            .filter_map(|line| {
                let (head, tail) = line.split_once(" - ")?;
                let mount = head.split_whitespace().nth(4)?;
                let mut tail = tail.split_whitespace();
                let fs = tail.next()?;
                let device = tail.next()?;
                Some(MountEntry {
                    device: unescape_octal(device),
                    mount: unescape_octal(mount),
                    fs: fs.to_string(),
                })
            })
            .collect()
    }
}

/// Decimal text to hundredths, truncating extra digits: "0.527" is 52.
fn centi(text: &str) -> Option<i64> {
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    let whole: i64 = whole.parse().ok()?;
    let mut hundredths = 0i64;
    for c in fraction.chars().chain(std::iter::repeat('0')).take(2) {
        hundredths = hundredths * 10 + i64::from(c.to_digit(10)?);
    }
    Some(whole * 100 + hundredths)
}

/// Decodes the `\ooo` escapes the kernel uses for blanks and backslashes.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn statvfs_usage(mount: &str) -> Result<FsUsage, SourceError> {
    let stat = nix::sys::statvfs::statvfs(Path::new(mount)).map_err(|source| {
        SourceError::Statvfs {
            mount: mount.to_string(),
            source,
        }
    })?;
    let fragment = stat.fragment_size() as u64;
    Ok(FsUsage {
        total_bytes: (stat.blocks() as u64).saturating_mul(fragment),
        available_bytes: (stat.blocks_available() as u64).saturating_mul(fragment),
    })
}

#[async_trait]
impl HostSource for ProcfsSource {
    async fn cpu_times(&self) -> Result<CpuTimes, SourceError> {
        let (path, content) = self.read("stat").await?;
        Self::parse_cpu_stat(&content)
            .ok_or_else(|| SourceError::malformed(path, "no aggregated cpu line"))
    }

    async fn load_average(&self) -> Result<LoadAverage, SourceError> {
        let (path, content) = self.read("loadavg").await?;
        Self::parse_loadavg(&content)
            .ok_or_else(|| SourceError::malformed(path, "expected three load averages"))
    }

    async fn memory(&self) -> Result<MemInfo, SourceError> {
        let (path, content) = self.read("meminfo").await?;
        Self::parse_meminfo(&content).ok_or_else(|| SourceError::malformed(path, "no MemTotal"))
    }

    async fn disk_stats(&self) -> Result<Vec<DiskStats>, SourceError> {
        let (_, content) = self.read("diskstats").await?;
        Ok(Self::parse_diskstats(&content))
    }

    async fn net_stats(&self) -> Result<Vec<NetStats>, SourceError> {
        let (_, content) = self.read("net/dev").await?;
        Ok(Self::parse_net_dev(&content))
    }

    async fn mounts(&self) -> Result<Vec<MountEntry>, SourceError> {
        let (_, content) = self.read("self/mountinfo").await?;
        Ok(Self::parse_mountinfo(&content))
    }

    async fn fs_usage(&self, mount: &str) -> Result<FsUsage, SourceError> {
        statvfs_usage(mount)
    }

    async fn temperatures(&self) -> Result<Temperatures, SourceError> {
        let sensors = self
            .sensors
            .get_or_init(|| HwmonSensors::discover(&self.sys_root))
            .await;
        Ok(sensors.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_stat() {
        let content = "cpu  4705 356 584 3699 23 0 27 5 0 0\n\
                       cpu0 1393 280 161 922 6 0 7 1 0 0\n\
                       intr 114930548 113199788 3 0 5 263 0 4 [...]\n";
        let times = ProcfsSource::parse_cpu_stat(content).unwrap();
        assert_eq!(
            times,
            CpuTimes {
                user: 4705,
                nice: 356,
                system: 584,
                idle: 3699,
                iowait: 23,
                irq: 0,
                softirq: 27,
                steal: 5,
            }
        );
    }

    #[test]
    fn test_parse_cpu_stat_old_kernel_and_garbage() {
        let times = ProcfsSource::parse_cpu_stat("cpu 10 20 30 40\n").unwrap();
        assert_eq!(times.idle, 40);
        assert_eq!(times.steal, 0);

        assert!(ProcfsSource::parse_cpu_stat("cpu0 1 2 3 4\n").is_none());
        assert!(ProcfsSource::parse_cpu_stat("cpu 1 2\n").is_none());
        assert!(ProcfsSource::parse_cpu_stat("cpu 1 x 3 4\n").is_none());
    }

    #[test]
    fn test_parse_loadavg() {
        let load = ProcfsSource::parse_loadavg("0.52 1.5 12.057 2/467 12345\n").unwrap();
        assert_eq!(
            load,
            LoadAverage {
                load1: 52,
                load5: 150,
                load15: 1205,
            }
        );
        assert!(ProcfsSource::parse_loadavg("0.52 oops\n").is_none());
        assert_eq!(centi("3"), Some(300));
    }

    #[test]
    fn test_parse_meminfo() {
        let content = "MemTotal:       16318460 kB\n\
                       MemFree:         1043064 kB\n\
                       MemAvailable:   10457016 kB\n\
                       Dirty:              1512 kB\n\
                       SwapTotal:       2097148 kB\n\
                       SwapFree:        2097148 kB\n\
                       HugePages_Total:       0\n";
        let info = ProcfsSource::parse_meminfo(content).unwrap();
        assert_eq!(info.total_kb, 16_318_460);
        assert_eq!(info.available_kb, 10_457_016);
        assert_eq!(info.dirty_kb, 1512);
        assert_eq!(info.swap_total_kb, 2_097_148);
        assert_eq!(info.swap_free_kb, 2_097_148);

        assert!(ProcfsSource::parse_meminfo("MemFree: 10 kB\n").is_none());
    }

    #[test]
    fn test_parse_diskstats() {
        let content = "   8       0 sda 3437 1173 282498 1806 2190 2765 130282 9251 0 6564 11512 0 0 0 0\n\
                          8       1 sda1 3372 1173 278306 1794 2189 2765 130282 9251 0 6540 11046\n\
                          7       0 loop0 short line\n";
        let stats = ProcfsSource::parse_diskstats(content);
        assert_eq!(stats.len(), 2);
        assert_eq!(
            stats[0],
            DiskStats {
                major: 8,
                minor: 0,
                name: "sda".to_string(),
                reads: 3437,
                read_ms: 1806,
                writes: 2190,
                write_ms: 9251,
            }
        );
        assert_eq!(stats[1].name, "sda1");
    }

    #[test]
    fn test_parse_net_dev() {
        let content = "Inter-|   Receive                                                |  Transmit\n \
                       face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n    \
                       lo: 1296 16 0 0 0 0 0 0 1296 16 0 0 0 0 0 0\n  \
                       eth0: 187325613 146254 0 0 0 0 0 0 9340175 73422 0 0 0 0 0 0\n";
        let stats = ProcfsSource::parse_net_dev(content);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "lo");
        assert_eq!(
            stats[1],
            NetStats {
                name: "eth0".to_string(),
                rx_bytes: 187_325_613,
                tx_bytes: 9_340_175,
            }
        );
    }

    #[test]
    fn test_parse_mountinfo() {
        let content = "22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw\n\
                       23 22 0:21 / /proc rw,nosuid shared:12 - proc proc rw\n\
                       40 22 8:17 / /mnt/my\\040disk rw master:1 - xfs /dev/sdb1 rw\n\
                       garbage line\n";
        let mounts = ProcfsSource::parse_mountinfo(content);
        assert_eq!(mounts.len(), 3);
        assert_eq!(
            mounts[0],
            MountEntry {
                device: "/dev/sda1".to_string(),
                mount: "/".to_string(),
                fs: "ext4".to_string(),
            }
        );
        assert_eq!(mounts[2].mount, "/mnt/my disk");
        assert_eq!(mounts[2].fs, "xfs");
    }

    #[test]
    fn test_unescape_octal() {
        assert_eq!(unescape_octal("a\\040b"), "a b");
        assert_eq!(unescape_octal("back\\134slash"), "back\\slash");
        assert_eq!(unescape_octal("trailing\\04"), "trailing\\04");
        assert_eq!(unescape_octal("not\\999octal"), "not\\999octal");
    }

    #[test]
    fn test_statvfs_root() {
        let usage = statvfs_usage("/").unwrap();
        assert!(usage.total_bytes >= usage.available_bytes);
        assert!(matches!(
            statvfs_usage("/definitely/not/mounted/here"),
            Err(SourceError::Statvfs { .. })
        ));
    }
}

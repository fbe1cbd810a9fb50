//! Block device I/O rates and latencies

use super::{write_detail, write_reduced, Family};
use crate::engine::clock::{Cadence, Tick};
use crate::engine::rate::{delta, latency, per_second, Baseline};
use crate::engine::reduce::{Reducer, Unit};
use crate::engine::registry::{bounded_key, Keyed, Registry, DEVICE_KEY_MAX};
use crate::engine::ring::{Series, Timeline};
use crate::engine::writer::JsonWriter;
use crate::error::Overflow;
use crate::models::DiskStats;

pub const PERIOD: i64 = 5;
pub const SPAN: usize = 60;

/// Whether `name` is a whole physical or virtual disk worth reporting.
///
/// Partitions are covered by their parent disk; loop and RAM devices carry
/// no physical I/O.
pub fn is_whole_disk(name: &str) -> bool {
    if ["loop", "ram", "zram"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
    {
        return false;
    }

    // nvme0n1p2, mmcblk0p1
    if let Some(pos) = name.rfind('p') {
        let (head, tail) = name.split_at(pos);
        let number = &tail[1..];
        if head.ends_with(|c: char| c.is_ascii_digit())
            && !number.is_empty()
            && number.chars().all(|c| c.is_ascii_digit())
        {
            return false;
        }
    }

    // sda1, vdb2, xvda3
    let lettered = ["sd", "vd", "hd", "xvd"]
        .iter()
        .any(|prefix| name.starts_with(prefix));
    !(lettered && name.ends_with(|c: char| c.is_ascii_digit()))
}

#[derive(Debug, Clone)]
pub struct DiskDevice {
    name: String,
    baseline: Baseline<DiskStats>,
    timeline: Timeline,
    rdrate: Series,
    rdwait: Series,
    wrrate: Series,
    wrwait: Series,
}

impl Keyed for DiskDevice {
    fn key(&self) -> &str {
        &self.name
    }
}

impl DiskDevice {
    fn new(stats: DiskStats) -> Self {
        Self {
            name: bounded_key(&stats.name, DEVICE_KEY_MAX).to_string(),
            baseline: Baseline::seeded(stats),
            timeline: Timeline::new(PERIOD, SPAN),
            rdrate: Series::new(SPAN),
            rdwait: Series::new(SPAN),
            wrrate: Series::new(SPAN),
            wrwait: Series::new(SPAN),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn record(&mut self, now: i64, current: Option<DiskStats>) {
        let index = self.timeline.stamp(now);
        let previous = current
            .clone()
            .and_then(|current| self.baseline.advance(current));

        let (rdrate, rdwait, wrrate, wrwait) = match (previous, current) {
            (Some(previous), Some(current)) => {
                let reads = delta(current.reads, previous.reads);
                let writes = delta(current.writes, previous.writes);
                (
                    per_second(reads, PERIOD),
                    latency(delta(current.read_ms, previous.read_ms), reads),
                    per_second(writes, PERIOD),
                    latency(delta(current.write_ms, previous.write_ms), writes),
                )
            }
            _ => (0, 0, 0, 0),
        };
        self.rdrate.set(index, rdrate);
        self.rdwait.set(index, rdwait);
        self.wrrate.set(index, wrrate);
        self.wrwait.set(index, wrwait);
    }

    fn series(&self) -> [(&'static str, &Series, Unit); 4] {
        [
            ("rdrate", &self.rdrate, Unit::READS_PER_SEC),
            ("rdwait", &self.rdwait, Unit::MS),
            ("wrrate", &self.wrrate, Unit::WRITES_PER_SEC),
            ("wrwait", &self.wrwait, Unit::MS),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct DiskFamily {
    cadence: Cadence,
    devices: Registry<DiskDevice>,
}

impl Default for DiskFamily {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskFamily {
    pub fn new() -> Self {
        Self {
            cadence: Cadence::new(PERIOD),
            devices: Registry::new(DEVICE_KEY_MAX),
        }
    }

    pub fn poll(&mut self, now: i64) -> Option<Tick> {
        self.cadence.poll(now)
    }

    /// Records one cycle and returns the names of newly discovered devices.
    ///
    /// Devices are discovered on the bootstrap tick, or on the first tick
    /// that finds any if none were found then; the set is fixed afterwards.
    /// A discovery tick only seeds baselines.
    pub fn record(&mut self, now: i64, tick: Tick, stats: Option<Vec<DiskStats>>) -> Vec<String> {
        if tick == Tick::Bootstrap || self.devices.is_empty() {
            return self.discover(stats.unwrap_or_default());
        }

        match stats {
            Some(stats) => {
                for current in stats {
                    if let Some(index) = self.devices.find(&current.name) {
                        if let Some(device) = self.devices.get_mut(index) {
                            device.record(now, Some(current));
                        }
                    }
                }
            }
            None => {
                for device in self.devices.iter_mut() {
                    device.record(now, None);
                }
            }
        }
        Vec::new()
    }

    fn discover(&mut self, stats: Vec<DiskStats>) -> Vec<String> {
        let mut added = Vec::new();
        for current in stats {
            if !is_whole_disk(&current.name) || self.devices.find(&current.name).is_some() {
                continue;
            }
            let device = DiskDevice::new(current);
            added.push(device.name.clone());
            self.devices.add(device);
        }
        added
    }
}

impl Family for DiskFamily {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn entities(&self) -> usize {
        self.devices.len()
    }

    fn status(
        &self,
        w: &mut JsonWriter,
        reducer: &mut Reducer,
        now: i64,
    ) -> Result<(), Overflow> {
        w.object(self.name(), |w| {
            for device in self.devices.iter() {
                w.object(&device.name, |w| {
                    for (name, series, unit) in device.series() {
                        write_reduced(w, reducer, name, &device.timeline, series, unit, now)?;
                    }
                    Ok(())
                })?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn details(&self, w: &mut JsonWriter, now: i64, since: i64) -> Result<(), Overflow> {
        w.object(self.name(), |w| {
            for device in self.devices.iter() {
                w.object(&device.name, |w| {
                    for (name, series, unit) in device.series() {
                        write_detail(w, name, &device.timeline, series, unit, now, since)?;
                    }
                    Ok(())
                })?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

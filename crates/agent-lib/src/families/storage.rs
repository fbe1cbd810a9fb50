//! Mounted filesystem capacity

use super::{write_detail, write_reduced, write_scalar, Family};
use crate::engine::clock::{Cadence, Tick};
use crate::engine::reduce::{Reducer, Unit};
use crate::engine::registry::{History, MountTable, Registration};
use crate::engine::ring::{Series, Timeline};
use crate::engine::writer::JsonWriter;
use crate::error::Overflow;
use crate::models::{FsUsage, MountEntry};

pub const PERIOD: i64 = 60;
pub const SPAN: usize = 5;
pub const CAPACITY: usize = 32;

/// A mount not re-observed for this long is released
pub const REFRESH: i64 = 60;

const MEGABYTE: u64 = 1024 * 1024;

/// Kernel pseudo filesystems; `/dev/shm` is the one tmpfs worth watching.
pub fn is_pseudo_mount(mount: &str) -> bool {
    if under(mount, "/dev/shm") {
        return false;
    }
    ["/sys", "/proc", "/run", "/dev"]
        .iter()
        .any(|prefix| under(mount, prefix))
}

/// `path` is `prefix` itself or lies below it.
fn under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn megabytes(bytes: u64) -> i64 {
    i64::try_from(bytes / MEGABYTE).unwrap_or(i64::MAX)
}

/// Capacity history of one mounted volume
#[derive(Debug, Clone)]
pub struct VolumeHistory {
    size_mb: i64,
    timeline: Timeline,
    free: Series,
}

impl Default for VolumeHistory {
    fn default() -> Self {
        Self {
            size_mb: 0,
            timeline: Timeline::new(PERIOD, SPAN),
            free: Series::new(SPAN),
        }
    }
}

impl History for VolumeHistory {
    fn clear(&mut self) {
        self.size_mb = 0;
        self.timeline.reset();
    }
}

impl VolumeHistory {
    pub fn size_mb(&self) -> i64 {
        self.size_mb
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }
}

/// What one enumeration changed in the mount table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountChanges {
    pub added: Vec<String>,
    pub replaced: Vec<String>,
    pub dropped: Vec<String>,
    pub removed: Vec<String>,
}

impl MountChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.replaced.is_empty()
            && self.dropped.is_empty()
            && self.removed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct StorageFamily {
    cadence: Cadence,
    mounts: MountTable<VolumeHistory>,
}

impl Default for StorageFamily {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageFamily {
    pub fn new() -> Self {
        Self {
            cadence: Cadence::new(PERIOD),
            mounts: MountTable::new(CAPACITY, REFRESH),
        }
    }

    pub fn poll(&mut self, now: i64) -> Option<Tick> {
        self.cadence.poll(now)
    }

    /// Registers the mounts observed at `now` and releases the ones that
    /// were not seen for a full refresh period.
    pub fn enumerate(&mut self, now: i64, entries: &[MountEntry]) -> MountChanges {
        let mut changes = MountChanges::default();
        for entry in entries.iter().filter(|e| !is_pseudo_mount(&e.mount)) {
            match self
                .mounts
                .register(now, &entry.device, &entry.mount, &entry.fs)
            {
                Registration::Refreshed(_) => {}
                Registration::Replaced(_) => changes.replaced.push(entry.mount.clone()),
                Registration::Added(_) => changes.added.push(entry.mount.clone()),
                Registration::Dropped => changes.dropped.push(entry.mount.clone()),
            }
        }
        changes.removed = self.mounts.prune(now);
        changes
    }

    /// Paths of every registered mount, for the capacity reads.
    pub fn mount_paths(&self) -> Vec<String> {
        self.mounts.iter().map(|m| m.mount.clone()).collect()
    }

    /// Records the capacity of `mount`. `None` stands for a failed read, which
    /// zeroes the size and hides the mount until the next success.
    pub fn record(&mut self, now: i64, mount: &str, usage: Option<FsUsage>) {
        let Some(entry) = self
            .mounts
            .find(mount)
            .and_then(|index| self.mounts.get_mut(index))
        else {
            return;
        };
        let history = &mut entry.history;
        let index = history.timeline.stamp(now);
        let usage = usage.unwrap_or_default();
        history.size_mb = megabytes(usage.total_bytes);
        history.free.set(index, megabytes(usage.available_bytes));
    }

    pub fn volume(&self, mount: &str) -> Option<&VolumeHistory> {
        self.mounts
            .find(mount)
            .and_then(|index| self.mounts.get(index))
            .map(|m| &m.history)
    }
}

impl Family for StorageFamily {
    fn name(&self) -> &'static str {
        "storage"
    }

    fn entities(&self) -> usize {
        self.mounts.len()
    }

    fn status(
        &self,
        w: &mut JsonWriter,
        reducer: &mut Reducer,
        now: i64,
    ) -> Result<(), Overflow> {
        w.object(self.name(), |w| {
            for mount in self.mounts.iter().filter(|m| m.history.size_mb > 0) {
                let history = &mount.history;
                w.object(&mount.mount, |w| {
                    write_scalar(w, "size", history.size_mb, Unit::MB)?;
                    write_reduced(
                        w,
                        reducer,
                        "free",
                        &history.timeline,
                        &history.free,
                        Unit::MB,
                        now,
                    )
                })?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn details(&self, w: &mut JsonWriter, now: i64, since: i64) -> Result<(), Overflow> {
        w.object(self.name(), |w| {
            for mount in self.mounts.iter().filter(|m| m.history.size_mb > 0) {
                let history = &mount.history;
                w.object(&mount.mount, |w| {
                    write_scalar(w, "size", history.size_mb, Unit::MB)?;
                    write_detail(
                        w,
                        "free",
                        &history.timeline,
                        &history.free,
                        Unit::MB,
                        now,
                        since,
                    )
                })?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

//! Registries of dynamically discovered entities
//!
//! [`Registry`] backs the device families: it only ever appends, so an index
//! handed out once stays valid for the life of the process. [`MountTable`]
//! backs the storage family: fixed capacity, entries refreshed by periodic
//! enumeration and released once they stop being observed.

/// Longest key kept for device and interface names
pub const DEVICE_KEY_MAX: usize = 15;

/// Longest key kept for mount paths
pub const MOUNT_KEY_MAX: usize = 511;

/// Truncates `key` to at most `max` bytes on a character boundary.
pub fn bounded_key(key: &str, max: usize) -> &str {
    if key.len() <= max {
        return key;
    }
    let mut end = max;
    while !key.is_char_boundary(end) {
        end -= 1;
    }
    &key[..end]
}

/// An entity addressable by a string key
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Append-only registry with stable indices
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: Vec<T>,
    key_limit: usize,
}

impl<T: Keyed> Registry<T> {
    pub fn new(key_limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            key_limit,
        }
    }

    /// Index of the entity registered under `key`.
    pub fn find(&self, key: &str) -> Option<usize> {
        let key = bounded_key(key, self.key_limit);
        self.entries.iter().position(|entry| entry.key() == key)
    }

    /// Appends `entry` and returns its index.
    ///
    /// The caller builds the entry from [`bounded_key`] so that lookups and
    /// stored keys agree.
    pub fn add(&mut self, entry: T) -> usize {
        debug_assert!(entry.key().len() <= self.key_limit);
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-mount history that must be forgotten when the volume changes
pub trait History: Default {
    fn clear(&mut self);
}

/// One registered mount point
#[derive(Debug, Clone)]
pub struct Mount<M> {
    /// Time of the last enumeration that observed this mount
    pub detected: i64,
    pub device: String,
    pub mount: String,
    pub fs: String,
    pub history: M,
}

/// Outcome of [`MountTable::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Known mount, same device and filesystem
    Refreshed(usize),
    /// Known mount whose device or filesystem changed; history was reset
    Replaced(usize),
    /// New mount stored in a free slot
    Added(usize),
    /// New mount ignored because every slot is taken
    Dropped,
}

/// Fixed-capacity table of mount points
#[derive(Debug, Clone)]
pub struct MountTable<M> {
    slots: Vec<Option<Mount<M>>>,
    refresh: i64,
}

impl<M: History> MountTable<M> {
    pub fn new(capacity: usize, refresh: i64) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            refresh,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, mount: &str) -> Option<usize> {
        let mount = bounded_key(mount, MOUNT_KEY_MAX);
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|m| m.mount == mount))
    }

    /// Records that `mount` was observed at `now`.
    pub fn register(&mut self, now: i64, device: &str, mount: &str, fs: &str) -> Registration {
        if let Some(index) = self.find(mount) {
            let Some(entry) = self.slots[index].as_mut() else {
                return Registration::Dropped;
            };
            entry.detected = now;
            if entry.device == device && entry.fs == fs {
                return Registration::Refreshed(index);
            }
            entry.device = device.to_string();
            entry.fs = fs.to_string();
            entry.history.clear();
            return Registration::Replaced(index);
        }

        let Some(index) = self.slots.iter().position(Option::is_none) else {
            return Registration::Dropped;
        };
        self.slots[index] = Some(Mount {
            detected: now,
            device: device.to_string(),
            mount: bounded_key(mount, MOUNT_KEY_MAX).to_string(),
            fs: fs.to_string(),
            history: M::default(),
        });
        Registration::Added(index)
    }

    /// Releases mounts not observed during the last refresh period and
    /// returns their paths.
    pub fn prune(&mut self, now: i64) -> Vec<String> {
        let refresh = self.refresh;
        let mut pruned = Vec::new();
        for slot in &mut self.slots {
            let stale = slot
                .as_ref()
                .is_some_and(|m| now - m.detected >= refresh);
            if stale {
                if let Some(mount) = slot.take() {
                    pruned.push(mount.mount);
                }
            }
        }
        pruned
    }

    pub fn get(&self, index: usize) -> Option<&Mount<M>> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Mount<M>> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Registered mounts in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Mount<M>> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Mount<M>> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}

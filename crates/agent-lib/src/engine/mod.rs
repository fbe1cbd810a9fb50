//! Metrics time-series engine
//!
//! Holds one context per metric family and renders them through the bounded
//! JSON writer. The engine is owned by a single task at a time: collection
//! and reporting both go through [`SharedEngine`] and never interleave.

pub mod clock;
pub mod detail;
pub mod rate;
pub mod reduce;
pub mod registry;
pub mod ring;
pub mod writer;

pub use clock::{Cadence, Clock, ManualClock, SystemClock, Tick};
pub use reduce::{Literal, Reducer, Unit};
pub use registry::{Keyed, MountTable, Registration, Registry};
pub use ring::{Series, Timeline};
pub use writer::JsonWriter;

use crate::error::Overflow;
use crate::families::{
    CpuFamily, DiskFamily, Family, MemoryFamily, NetFamily, StorageFamily, TempFamily,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Every family shares this retention window, in seconds
pub const RETENTION_SECS: i64 = 300;

/// Engine handle shared between the collection loop and the HTTP layer
pub type SharedEngine = Arc<Mutex<Engine>>;

/// All family contexts plus the reducer scratch space
#[derive(Debug)]
pub struct Engine {
    pub cpu: CpuFamily,
    pub memory: MemoryFamily,
    pub disk: DiskFamily,
    pub net: NetFamily,
    pub storage: StorageFamily,
    pub temp: TempFamily,
    reducer: Reducer,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            cpu: CpuFamily::new(),
            memory: MemoryFamily::new(),
            disk: DiskFamily::new(),
            net: NetFamily::new(),
            storage: StorageFamily::new(),
            temp: TempFamily::new(),
            reducer: Reducer::with_capacity(64),
        }
    }

    pub fn shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    fn families(&self) -> [&dyn Family; 6] {
        [
            &self.cpu,
            &self.memory,
            &self.disk,
            &self.net,
            &self.storage,
            &self.temp,
        ]
    }

    /// Writes the reduced view of every family as members of the current
    /// object.
    pub fn status(&mut self, w: &mut JsonWriter, now: i64) -> Result<(), Overflow> {
        let Engine {
            cpu,
            memory,
            disk,
            net,
            storage,
            temp,
            reducer,
        } = self;
        let families: [&dyn Family; 6] = [&*cpu, &*memory, &*disk, &*net, &*storage, &*temp];
        for family in families {
            family.status(w, reducer, now)?;
        }
        Ok(())
    }

    /// Writes the full time series of every family, limited to samples taken
    /// at or after `since`.
    pub fn details(&self, w: &mut JsonWriter, now: i64, since: i64) -> Result<(), Overflow> {
        for family in self.families() {
            family.details(w, now, since)?;
        }
        Ok(())
    }

    /// Number of tracked entities per family.
    pub fn entity_counts(&self) -> Vec<(&'static str, usize)> {
        self.families()
            .iter()
            .map(|family| (family.name(), family.entities()))
            .collect()
    }
}

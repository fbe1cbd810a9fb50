//! Metric family contexts
//!
//! Each family owns its cadence, its entities and their sample history. The
//! collection loop feeds readings in; the report layer reads them out through
//! the [`Family`] trait.

mod cpu;
mod disk;
mod memory;
mod net;
mod storage;
mod temp;

pub use cpu::CpuFamily;
pub use disk::{is_whole_disk, DiskDevice, DiskFamily};
pub use memory::MemoryFamily;
pub use net::{NetFamily, NetInterface};
pub use storage::{is_pseudo_mount, MountChanges, StorageFamily, VolumeHistory};
pub use temp::TempFamily;

use crate::engine::detail;
use crate::engine::reduce::{Reducer, Unit};
use crate::engine::ring::{Series, Timeline};
use crate::engine::writer::JsonWriter;
use crate::error::Overflow;

/// Rendering side of a family context
pub trait Family: Send + Sync {
    /// Key of the family in the report documents
    fn name(&self) -> &'static str;

    /// Number of tracked entities
    fn entities(&self) -> usize;

    /// Writes `"name":{...}` with the reduced window ending at `now` of every
    /// metric.
    fn status(&self, w: &mut JsonWriter, reducer: &mut Reducer, now: i64) -> Result<(), Overflow>;

    /// Writes `"name":{...}` with every sample taken at or after `since`.
    fn details(&self, w: &mut JsonWriter, now: i64, since: i64) -> Result<(), Overflow>;
}

pub(crate) fn write_reduced(
    w: &mut JsonWriter,
    reducer: &mut Reducer,
    name: &str,
    timeline: &Timeline,
    series: &Series,
    unit: Unit,
    now: i64,
) -> Result<(), Overflow> {
    match reducer.reduce(series.populated(timeline, now)) {
        Some(literal) => w.member(name, &literal.render(unit)),
        None => Ok(()),
    }
}

pub(crate) fn write_detail(
    w: &mut JsonWriter,
    name: &str,
    timeline: &Timeline,
    series: &Series,
    unit: Unit,
    now: i64,
    since: i64,
) -> Result<(), Overflow> {
    let samples = detail::detail(timeline, series, now, since);
    match detail::render(&samples, unit) {
        Some(text) => w.member(name, &text),
        None => Ok(()),
    }
}

/// `"name":[value,unit]` for a scalar attribute.
pub(crate) fn write_scalar(
    w: &mut JsonWriter,
    name: &str,
    value: i64,
    unit: Unit,
) -> Result<(), Overflow> {
    w.member(name, &format!("[{value},{unit}]"))
}

//! Host-wide memory usage

use super::{write_detail, write_reduced, write_scalar, Family};
use crate::engine::clock::{Cadence, Tick};
use crate::engine::rate::percent_of;
use crate::engine::reduce::{Reducer, Unit};
use crate::engine::ring::{Series, Timeline};
use crate::engine::writer::JsonWriter;
use crate::error::Overflow;
use crate::models::MemInfo;

pub const PERIOD: i64 = 10;
pub const SPAN: usize = 30;

fn megabytes(kb: u64) -> i64 {
    i64::try_from(kb / 1024).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
pub struct MemoryFamily {
    cadence: Cadence,
    timeline: Timeline,
    available: Series,
    used: Series,
    dirty: Series,
    swapped: Series,
    ram_mb: i64,
    swap_mb: i64,
}

impl Default for MemoryFamily {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFamily {
    pub fn new() -> Self {
        Self {
            cadence: Cadence::new(PERIOD),
            timeline: Timeline::new(PERIOD, SPAN),
            available: Series::new(SPAN),
            used: Series::new(SPAN),
            dirty: Series::new(SPAN),
            swapped: Series::new(SPAN),
            ram_mb: 0,
            swap_mb: 0,
        }
    }

    pub fn poll(&mut self, now: i64) -> Option<Tick> {
        self.cadence.poll(now)
    }

    /// Records one cycle. Memory figures are gauges, so the bootstrap tick
    /// samples like any other.
    pub fn record(&mut self, now: i64, info: Option<MemInfo>) {
        let index = self.timeline.stamp(now);
        let info = info.unwrap_or_default();

        let total = megabytes(info.total_kb);
        let available = megabytes(info.available_kb);
        self.ram_mb = total;
        self.swap_mb = megabytes(info.swap_total_kb);

        self.available.set(index, available);
        self.used.set(index, percent_of(total - available, total));
        self.dirty.set(index, megabytes(info.dirty_kb));
        self.swapped.set(
            index,
            megabytes(info.swap_total_kb.saturating_sub(info.swap_free_kb)),
        );
    }

    fn write_body(
        &self,
        w: &mut JsonWriter,
        mut series: impl FnMut(&mut JsonWriter, &'static str, &Series, Unit) -> Result<(), Overflow>,
    ) -> Result<(), Overflow> {
        write_scalar(w, "ram", self.ram_mb, Unit::MB)?;
        series(w, "available", &self.available, Unit::MB)?;
        series(w, "used", &self.used, Unit::PERCENT)?;
        series(w, "dirty", &self.dirty, Unit::MB)?;
        if self.swap_mb > 0 {
            write_scalar(w, "swap", self.swap_mb, Unit::MB)?;
            series(w, "swapped", &self.swapped, Unit::MB)?;
        }
        Ok(())
    }
}

impl Family for MemoryFamily {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn entities(&self) -> usize {
        1
    }

    fn status(
        &self,
        w: &mut JsonWriter,
        reducer: &mut Reducer,
        now: i64,
    ) -> Result<(), Overflow> {
        if self.ram_mb <= 0 {
            return Ok(());
        }
        w.object(self.name(), |w| {
            self.write_body(w, |w, name, series, unit| {
                write_reduced(w, reducer, name, &self.timeline, series, unit, now)
            })
        })?;
        Ok(())
    }

    fn details(&self, w: &mut JsonWriter, now: i64, since: i64) -> Result<(), Overflow> {
        if self.ram_mb <= 0 {
            return Ok(());
        }
        w.object(self.name(), |w| {
            self.write_body(w, |w, name, series, unit| {
                write_detail(w, name, &self.timeline, series, unit, now, since)
            })
        })?;
        Ok(())
    }
}

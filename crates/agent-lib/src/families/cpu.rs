//! Host-wide CPU utilization and load average

use super::{write_detail, write_reduced, Family};
use crate::engine::clock::{Cadence, Tick};
use crate::engine::rate::{delta, percent_of, Baseline};
use crate::engine::reduce::{Reducer, Unit};
use crate::engine::ring::{Series, Timeline};
use crate::engine::writer::JsonWriter;
use crate::error::Overflow;
use crate::models::{CpuTimes, LoadAverage};

pub const PERIOD: i64 = 5;
pub const SPAN: usize = 60;

#[derive(Debug, Clone)]
pub struct CpuFamily {
    cadence: Cadence,
    baseline: Baseline<CpuTimes>,
    timeline: Timeline,
    busy: Series,
    iowait: Series,
    steal: Series,
    load: LoadAverage,
}

impl Default for CpuFamily {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuFamily {
    pub fn new() -> Self {
        Self {
            cadence: Cadence::new(PERIOD),
            baseline: Baseline::new(),
            timeline: Timeline::new(PERIOD, SPAN),
            busy: Series::new(SPAN),
            iowait: Series::new(SPAN),
            steal: Series::new(SPAN),
            load: LoadAverage::default(),
        }
    }

    pub fn poll(&mut self, now: i64) -> Option<Tick> {
        self.cadence.poll(now)
    }

    /// Records one cycle. `None` stands for an unavailable source.
    pub fn record(
        &mut self,
        now: i64,
        tick: Tick,
        times: Option<CpuTimes>,
        load: Option<LoadAverage>,
    ) {
        self.load = load.unwrap_or_default();

        // Until a reading seeds the baseline every tick is a bootstrap tick.
        if tick == Tick::Bootstrap || !self.baseline.is_seeded() {
            if let Some(times) = times {
                self.baseline.advance(times);
            }
            return;
        }

        let index = self.timeline.stamp(now);
        let (busy, iowait, steal) = times
            .and_then(|current| {
                self.baseline
                    .advance(current)
                    .map(|previous| shares(&previous, &current))
            })
            .unwrap_or((0, 0, 0));
        self.busy.set(index, busy);
        self.iowait.set(index, iowait);
        self.steal.set(index, steal);
    }

    fn series(&self) -> [(&'static str, &Series); 3] {
        [
            ("busy", &self.busy),
            ("iowait", &self.iowait),
            ("steal", &self.steal),
        ]
    }

    fn write_load(&self, w: &mut JsonWriter) -> Result<(), Overflow> {
        let LoadAverage {
            load1,
            load5,
            load15,
        } = self.load;
        if load1 > 0 || load5 > 0 || load15 > 0 {
            w.member(
                "load",
                &format!("[{load1},{load5},{load15},{}]", Unit::NONE),
            )?;
        }
        Ok(())
    }
}

/// Busy, iowait and steal shares of the ticks elapsed between two readings.
///
/// Idle time includes iowait: a CPU waiting on I/O is not doing work.
fn shares(previous: &CpuTimes, current: &CpuTimes) -> (i64, i64, i64) {
    let fields = |t: &CpuTimes| {
        [
            t.user, t.nice, t.system, t.idle, t.iowait, t.irq, t.softirq, t.steal,
        ]
    };
    let total: i64 = fields(current)
        .iter()
        .zip(fields(previous).iter())
        .map(|(c, p)| delta(*c, *p).max(0))
        .sum();
    if total <= 0 {
        return (0, 0, 0);
    }

    let iowait = delta(current.iowait, previous.iowait).max(0);
    let idle = delta(current.idle, previous.idle).max(0) + iowait;
    let steal = delta(current.steal, previous.steal).max(0);
    (
        percent_of(total - idle, total),
        percent_of(iowait, total),
        percent_of(steal, total),
    )
}

impl Family for CpuFamily {
    fn name(&self) -> &'static str {
        "cpu"
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
        w.object(self.name(), |w| {
            for (name, series) in self.series() {
                write_reduced(w, reducer, name, &self.timeline, series, Unit::PERCENT, now)?;
            }
            self.write_load(w)
        })?;
        Ok(())
    }

    fn details(&self, w: &mut JsonWriter, now: i64, since: i64) -> Result<(), Overflow> {
        w.object(self.name(), |w| {
            for (name, series) in self.series() {
                write_detail(w, name, &self.timeline, series, Unit::PERCENT, now, since)?;
            }
            self.write_load(w)
        })?;
        Ok(())
    }
}

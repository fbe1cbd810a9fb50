//! CPU and GPU temperatures

use super::{write_detail, write_reduced, Family};
use crate::engine::clock::{Cadence, Tick};
use crate::engine::reduce::{Reducer, Unit};
use crate::engine::ring::{Series, Timeline};
use crate::engine::writer::JsonWriter;
use crate::engine::RETENTION_SECS;
use crate::error::Overflow;
use crate::models::Temperatures;

pub const PERIOD: i64 = 5;
pub const SPAN: usize = 60;

/// Interval of the averaged CPU temperature log record
pub const SENSOR_INTERVAL: i64 = RETENTION_SECS;

#[derive(Debug, Clone)]
pub struct TempFamily {
    cadence: Cadence,
    timeline: Timeline,
    cpu: Series,
    gpu: Series,
    has_cpu: bool,
    has_gpu: bool,
    next_sensor_report: Option<i64>,
}

impl Default for TempFamily {
    fn default() -> Self {
        Self::new()
    }
}

impl TempFamily {
    pub fn new() -> Self {
        Self {
            cadence: Cadence::new(PERIOD),
            timeline: Timeline::new(PERIOD, SPAN),
            cpu: Series::new(SPAN),
            gpu: Series::new(SPAN),
            has_cpu: false,
            has_gpu: false,
            next_sensor_report: None,
        }
    }

    pub fn poll(&mut self, now: i64) -> Option<Tick> {
        self.cadence.poll(now)
    }

    /// Records one cycle. A sensor that was never found is not reported.
    pub fn record(&mut self, now: i64, readings: Option<Temperatures>) {
        let index = self.timeline.stamp(now);
        let readings = readings.unwrap_or_default();

        self.has_cpu |= readings.cpu.is_some();
        self.has_gpu |= readings.gpu.is_some();
        self.cpu.set(index, readings.cpu.unwrap_or(0));
        self.gpu.set(index, readings.gpu.unwrap_or(0));
    }

    /// Average CPU temperature over the window in whole degrees Celsius,
    /// once per [`SENSOR_INTERVAL`], aligned on multiples of it.
    pub fn sensor_report(&mut self, now: i64) -> Option<i64> {
        let next = *self
            .next_sensor_report
            .get_or_insert_with(|| aligned_after(now + SENSOR_INTERVAL));
        if now < next {
            return None;
        }
        self.next_sensor_report = Some(aligned_after(now + SENSOR_INTERVAL));

        if !self.has_cpu {
            return None;
        }
        let (sum, count) = self
            .cpu
            .populated(&self.timeline, now)
            .filter(|v| *v != 0)
            .fold((0i64, 0i64), |(sum, count), v| (sum + v, count + 1));
        (count > 0).then(|| sum / count / 1000)
    }

    fn series(&self) -> impl Iterator<Item = (&'static str, &Series)> {
        [("cpu", &self.cpu, self.has_cpu), ("gpu", &self.gpu, self.has_gpu)]
            .into_iter()
            .filter(|(_, _, present)| *present)
            .map(|(name, series, _)| (name, series))
    }
}

/// First multiple of [`SENSOR_INTERVAL`] at or after `time`.
fn aligned_after(time: i64) -> i64 {
    let rem = time.rem_euclid(SENSOR_INTERVAL);
    if rem == 0 {
        time
    } else {
        time - rem + SENSOR_INTERVAL
    }
}

impl Family for TempFamily {
    fn name(&self) -> &'static str {
        "temp"
    }

    fn entities(&self) -> usize {
        usize::from(self.has_cpu) + usize::from(self.has_gpu)
    }

    fn status(
        &self,
        w: &mut JsonWriter,
        reducer: &mut Reducer,
        now: i64,
    ) -> Result<(), Overflow> {
        w.object(self.name(), |w| {
            for (name, series) in self.series() {
                write_reduced(w, reducer, name, &self.timeline, series, Unit::MILLI_CELSIUS, now)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn details(&self, w: &mut JsonWriter, now: i64, since: i64) -> Result<(), Overflow> {
        w.object(self.name(), |w| {
            for (name, series) in self.series() {
                write_detail(
                    w,
                    name,
                    &self.timeline,
                    series,
                    Unit::MILLI_CELSIUS,
                    now,
                    since,
                )?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::testing::status_json;
    use serde_json::json;

    const START: i64 = 1_700_000_100;

    #[test]
    fn test_missing_sensors_are_not_reported() {
        let mut temp = TempFamily::new();
        temp.record(
            START,
            Some(Temperatures {
                cpu: Some(45_000),
                gpu: None,
            }),
        );
        let status = status_json(&temp, START);
        assert_eq!(status["temp"]["cpu"], json!([45000, "mC"]));
        assert!(status["temp"].get("gpu").is_none());
        assert_eq!(temp.entities(), 1);
    }

    #[test]
    fn test_unavailable_readings_are_zero() {
        let mut temp = TempFamily::new();
        temp.record(
            START,
            Some(Temperatures {
                cpu: Some(50_000),
                gpu: Some(60_000),
            }),
        );
        temp.record(START + 5, None);
        let status = status_json(&temp, START + 5);
        assert_eq!(status["temp"]["cpu"], json!([0, 50000, "mC"]));
        assert_eq!(status["temp"]["gpu"], json!([0, 60000, "mC"]));
    }

    #[test]
    fn test_aligned_after() {
        assert_eq!(aligned_after(600), 600);
        assert_eq!(aligned_after(601), 900);
        assert_eq!(aligned_after(899), 900);
    }

    #[test]
    fn test_sensor_report_is_aligned_and_averaged() {
        let mut temp = TempFamily::new();
        // First report is due at the first multiple of 300 s at least 300 s ahead.
        let due = aligned_after(START + SENSOR_INTERVAL);
        let mut now = START;
        while now < due {
            temp.record(
                now,
                Some(Temperatures {
                    cpu: Some(if (now / 5) % 2 == 0 { 40_000 } else { 50_000 }),
                    gpu: None,
                }),
            );
            assert_eq!(temp.sensor_report(now), None);
            now += 5;
        }
        assert_eq!(temp.sensor_report(due), Some(45));
        assert_eq!(temp.sensor_report(due + 5), None);
        // Nothing was sampled during the last window.
        assert_eq!(temp.sensor_report(due + SENSOR_INTERVAL), None);
    }

    #[test]
    fn test_sensor_report_without_cpu_sensor() {
        let mut temp = TempFamily::new();
        temp.record(START, Some(Temperatures::default()));
        assert_eq!(temp.sensor_report(START), None);
        assert_eq!(temp.sensor_report(START + 2 * SENSOR_INTERVAL), None);
    }
}

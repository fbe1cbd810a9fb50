//! Reconstruction of a chronological time series from the circular store

use super::reduce::Unit;
use super::ring::{Series, Timeline};
use std::fmt::Write as _;

/// Samples of `series` taken at or after `since`, oldest first.
///
/// The scan starts right after the slot `now` occupies and wraps around to
/// end on it. Unpopulated slots are skipped, and so is any slot whose
/// timestamp does not advance past the previous sample.
pub fn detail(timeline: &Timeline, series: &Series, now: i64, since: i64) -> Vec<(i64, i64)> {
    let stamps = timeline.timestamps();
    let mut samples = Vec::new();
    let mut last = i64::MIN;

    for index in timeline.chronological(now) {
        let stamp = stamps[index];
        if stamp == 0 || stamp < since || stamp <= last {
            continue;
        }
        samples.push((stamp, series.get(index)));
        last = stamp;
    }
    samples
}

/// Flat JSON array alternating timestamp and value, closed by the unit.
///
/// Returns `None` when there is no sample to report.
pub fn render(samples: &[(i64, i64)], unit: Unit) -> Option<String> {
    if samples.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(samples.len() * 18 + 8);
    out.push('[');
    for (stamp, value) in samples {
        let _ = write!(out, "{stamp},{value},");
    }
    let _ = write!(out, "{unit}]");
    Some(out)
}

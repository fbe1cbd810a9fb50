//! Fixed-length circular sample store addressed by wall-clock time
//!
//! A [`Timeline`] holds the timestamps of one entity and decides which slot a
//! given time maps to. Every [`Series`] of that entity is written at the same
//! slot in the same cycle, so one timeline serves all of them.

/// Slot timestamps of one entity
#[derive(Debug, Clone)]
pub struct Timeline {
    period: i64,
    stamps: Vec<i64>,
}

impl Timeline {
    pub fn new(period: i64, span: usize) -> Self {
        assert!(period > 0 && span > 0, "period and span must be positive");
        Self {
            period,
            stamps: vec![0; span],
        }
    }

    /// Retention window in seconds
    pub fn window(&self) -> i64 {
        self.period * self.stamps.len() as i64
    }

    /// Slot index for `time`: `floor(time / period) mod span`
    pub fn slot(&self, time: i64) -> usize {
        time.div_euclid(self.period).rem_euclid(self.stamps.len() as i64) as usize
    }

    /// Claims the slot for `now`, discarding whatever it held before.
    pub fn stamp(&mut self, now: i64) -> usize {
        let index = self.slot(now);
        self.stamps[index] = now;
        index
    }

    /// Marks every slot unpopulated.
    pub fn reset(&mut self) {
        self.stamps.iter_mut().for_each(|stamp| *stamp = 0);
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.stamps
    }

    /// Slot indices from the oldest logical entry to the one `now` occupies.
    pub fn chronological(&self, now: i64) -> impl Iterator<Item = usize> {
        let span = self.stamps.len();
        let current = self.slot(now);
        (1..=span).map(move |offset| (current + offset) % span)
    }
}

/// Values of one measured quantity, parallel to a [`Timeline`]
#[derive(Debug, Clone)]
pub struct Series {
    values: Vec<i64>,
}

impl Series {
    pub fn new(span: usize) -> Self {
        Self {
            values: vec![0; span],
        }
    }

    pub fn set(&mut self, index: usize, value: i64) {
        self.values[index] = value;
    }

    pub fn get(&self, index: usize) -> i64 {
        self.values[index]
    }

    /// Values of the slots populated within the retention window ending at
    /// `now`, in slot order.
    ///
    /// A slot that was not overwritten for a whole window belongs to an
    /// entity that stopped reporting and is left out.
    pub fn populated<'a>(
        &'a self,
        timeline: &'a Timeline,
        now: i64,
    ) -> impl Iterator<Item = i64> + 'a {
        let oldest = now - timeline.window();
        timeline
            .timestamps()
            .iter()
            .zip(self.values.iter())
            .filter(move |(stamp, _)| **stamp != 0 && **stamp > oldest)
            .map(|(_, value)| *value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_addressing() {
        let timeline = Timeline::new(5, 60);
        assert_eq!(timeline.slot(0), 0);
        assert_eq!(timeline.slot(4), 0);
        assert_eq!(timeline.slot(5), 1);
        assert_eq!(timeline.slot(299), 59);
        assert_eq!(timeline.slot(300), 0);
        assert_eq!(timeline.window(), 300);
    }

    #[test]
    fn test_stamp_overwrites_only_the_slot_one_window_back() {
        let mut timeline = Timeline::new(5, 60);
        for t in (1_700_000_000..1_700_000_300).step_by(5) {
            timeline.stamp(t);
        }
        let before = timeline.timestamps().to_vec();

        let t = 1_700_000_300;
        let index = timeline.stamp(t);
        let after = timeline.timestamps();

        assert_eq!(before[index], t - 300);
        assert_eq!(after[index], t);
        for i in 0..60 {
            if i != index {
                assert_eq!(before[i], after[i], "slot {i} must be untouched");
            }
        }
    }

    #[test]
    fn test_chronological_starts_after_current_slot() {
        let timeline = Timeline::new(10, 4);
        let order: Vec<usize> = timeline.chronological(25).collect();
        // 25 maps to slot 2: oldest is 3, newest is 2.
        assert_eq!(order, vec![3, 0, 1, 2]);
    }

    #[test]
    fn test_reset_and_populated_values() {
        let mut timeline = Timeline::new(5, 4);
        let mut series = Series::new(4);
        let i = timeline.stamp(5);
        series.set(i, 42);
        let j = timeline.stamp(10);
        series.set(j, 7);

        let mut values: Vec<i64> = series.populated(&timeline, 10).collect();
        values.sort();
        assert_eq!(values, vec![7, 42]);

        timeline.reset();
        assert_eq!(series.populated(&timeline, 10).count(), 0);
        assert_eq!(timeline.timestamps()[i], 0);
    }

    #[test]
    fn test_populated_skips_slots_older_than_the_window() {
        let mut timeline = Timeline::new(5, 4);
        let mut series = Series::new(4);
        let stale = timeline.stamp(100);
        series.set(stale, 9);
        let fresh = timeline.stamp(105);
        series.set(fresh, 3);

        let values: Vec<i64> = series.populated(&timeline, 119).collect();
        assert_eq!(values.len(), 2);
        // 100 is a full window (20 s) behind 120.
        let values: Vec<i64> = series.populated(&timeline, 120).collect();
        assert_eq!(values, vec![3]);
        assert_eq!(series.populated(&timeline, 200).count(), 0);
    }
}

//! Conversion of monotonically increasing kernel counters into rates
//!
//! Counter wraparound and counter reset both show up as a negative delta and
//! are treated the same way: the rate for that period is zero.

/// Last raw reading of an entity, used as the origin of the next delta
#[derive(Debug, Clone, Default)]
pub struct Baseline<T> {
    previous: Option<T>,
}

impl<T> Baseline<T> {
    pub fn new() -> Self {
        Self { previous: None }
    }

    pub fn seeded(reading: T) -> Self {
        Self {
            previous: Some(reading),
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.previous.is_some()
    }

    /// Stores `current` as the new baseline and hands back the old one.
    pub fn advance(&mut self, current: T) -> Option<T> {
        self.previous.replace(current)
    }
}

/// Signed difference between two counter readings.
pub fn delta(current: u64, previous: u64) -> i64 {
    let diff = i128::from(current) - i128::from(previous);
    diff.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Events per second over one period; negative deltas count as zero.
pub fn per_second(delta: i64, period: i64) -> i64 {
    if delta <= 0 || period <= 0 {
        return 0;
    }
    delta / period
}

/// Share of `total` taken by `part`, in whole percent clamped to 0..=100.
pub fn percent_of(part: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    ((100 * i128::from(part)) / i128::from(total)).clamp(0, 100) as i64
}

/// Average wait per operation, zero when no operation completed.
pub fn latency(wait: i64, count: i64) -> i64 {
    if count <= 0 {
        return 0;
    }
    wait.max(0) / count
}

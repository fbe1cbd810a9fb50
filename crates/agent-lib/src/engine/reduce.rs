//! Quantile reduction of a sampling window into a compact JSON literal
//!
//! A window is reported as one of:
//! - nothing, when every populated value is zero
//! - `[value,unit]` when all values are equal
//! - `[min,max,unit]` with fewer than ten values
//! - `[min,median,max,unit]` otherwise

use std::fmt::{self, Write as _};

/// Number of values from which the median is reported
pub const MEDIAN_THRESHOLD: usize = 10;

/// Unit tag closing every literal; unitless literals carry `0`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit(Option<&'static str>);

impl Unit {
    pub const NONE: Unit = Unit(None);
    pub const PERCENT: Unit = Unit(Some("%"));
    pub const MB: Unit = Unit(Some("MB"));
    pub const KB_PER_SEC: Unit = Unit(Some("KB/s"));
    pub const READS_PER_SEC: Unit = Unit(Some("r/s"));
    pub const WRITES_PER_SEC: Unit = Unit(Some("w/s"));
    pub const MS: Unit = Unit(Some("ms"));
    pub const MILLI_CELSIUS: Unit = Unit(Some("mC"));
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(name) => write!(f, "\"{name}\""),
            None => f.write_str("0"),
        }
    }
}

/// Reduced form of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    Single(i64),
    Range { min: i64, max: i64 },
    Quantiles { min: i64, median: i64, max: i64 },
}

impl Literal {
    /// JSON array text, e.g. `[10,15,20,"%"]`.
    pub fn render(&self, unit: Unit) -> String {
        let mut out = String::with_capacity(48);
        // Writing into a String cannot fail.
        let _ = match *self {
            Literal::Single(v) => write!(out, "[{v},{unit}]"),
            Literal::Range { min, max } => write!(out, "[{min},{max},{unit}]"),
            Literal::Quantiles { min, median, max } => {
                write!(out, "[{min},{median},{max},{unit}]")
            }
        };
        out
    }
}

/// Reducer owning a scratch buffer reused across calls
#[derive(Debug, Default)]
pub struct Reducer {
    scratch: Vec<i64>,
}

impl Reducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(span: usize) -> Self {
        Self {
            scratch: Vec::with_capacity(span),
        }
    }

    /// Reduces `values` without touching the series they come from.
    pub fn reduce<I>(&mut self, values: I) -> Option<Literal>
    where
        I: IntoIterator<Item = i64>,
    {
        self.scratch.clear();
        self.scratch.extend(values);
        if self.scratch.is_empty() {
            return None;
        }
        self.scratch.sort_unstable();

        let sorted = &self.scratch;
        let count = sorted.len();
        let min = sorted[0];
        let max = sorted[count - 1];

        if min == max {
            return (min != 0).then_some(Literal::Single(min));
        }
        if count < MEDIAN_THRESHOLD {
            return Some(Literal::Range { min, max });
        }

        let median = if count % 2 == 1 {
            sorted[count / 2]
        } else {
            let half = count / 2;
            ((i128::from(sorted[half - 1]) + i128::from(sorted[half])) / 2) as i64
        };
        Some(Literal::Quantiles { min, median, max })
    }
}

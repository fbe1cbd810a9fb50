//! Wall clock injection and per-family collection cadence

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current time in UNIX epoch seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Real wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Manually driven clock for deterministic tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// What a due collection cycle is expected to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// First cycle since start: seed baselines, no rate is available yet
    Bootstrap,
    /// Regular cycle
    Sample,
}

/// Gate that fires at most once per period
#[derive(Debug, Clone)]
pub struct Cadence {
    period: i64,
    next: Option<i64>,
}

impl Cadence {
    pub fn new(period: i64) -> Self {
        Self { period, next: None }
    }

    pub fn period(&self) -> i64 {
        self.period
    }

    /// Returns the kind of cycle to run if one is due at `now`.
    pub fn poll(&mut self, now: i64) -> Option<Tick> {
        match self.next {
            Some(next) if now < next => None,
            Some(_) => {
                self.next = Some(now + self.period);
                Some(Tick::Sample)
            }
            None => {
                self.next = Some(now + self.period);
                Some(Tick::Bootstrap)
            }
        }
    }
}

//! Metrics collection loop
//!
//! Wakes up on a short tick, asks each family whether it is due, pulls the
//! due sources and records into the shared engine. The engine stays locked
//! for the whole cycle so a report never sees a half-recorded cycle.

use super::HostSource;
use crate::engine::clock::{Clock, SystemClock};
use crate::engine::{Engine, SharedEngine};
use crate::error::SourceError;
use crate::health::{components, HealthRegistry};
use crate::observability::{AgentMetrics, StructuredLogger};
use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// How often family cadences are polled (default: 1 second)
    pub tick: Duration,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
        }
    }
}

/// Families that ran in one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sampled: Vec<&'static str>,
}

/// Failures seen while collecting one family
#[derive(Default)]
struct FamilyOutcome {
    first_failure: Option<String>,
}

pub struct CollectionLoop {
    source: Arc<dyn HostSource>,
    engine: SharedEngine,
    clock: Arc<dyn Clock>,
    health: HealthRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    config: CollectionConfig,
    /// Families whose last cycle had a source failure
    failing: BTreeSet<&'static str>,
}

impl CollectionLoop {
    pub fn new(
        source: Arc<dyn HostSource>,
        engine: SharedEngine,
        clock: Arc<dyn Clock>,
        health: HealthRegistry,
        logger: StructuredLogger,
        config: CollectionConfig,
    ) -> Self {
        Self {
            source,
            engine,
            clock,
            health,
            metrics: AgentMetrics::new(),
            logger,
            config,
            failing: BTreeSet::new(),
        }
    }

    /// Runs until `shutdown` fires. The agent becomes ready after the first
    /// completed cycle.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            tick_ms = self.config.tick.as_millis() as u64,
            "Starting metrics collection loop"
        );

        let mut ticker = interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    cycles += 1;
                    if cycles == 1 {
                        self.health.set_ready(true).await;
                    }
                    if !report.sampled.is_empty() {
                        debug!(families = ?report.sampled, "Collection cycle complete");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down metrics collection loop");
                    break;
                }
            }
        }
    }

    /// Runs every family that is due at the current clock time.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let now = self.clock.now();
        let engine = Arc::clone(&self.engine);
        let mut engine = engine.lock().await;
        let mut report = CycleReport::default();

        if let Some(tick) = engine.cpu.poll(now) {
            let started = Instant::now();
            let mut outcome = FamilyOutcome::default();
            let times = self.source.cpu_times().await;
            let times = self.accept(components::CPU, times, &mut outcome);
            let load = self.source.load_average().await;
            let load = self.accept(components::CPU, load, &mut outcome);
            engine.cpu.record(now, tick, times, load);
            self.finish(components::CPU, started, outcome, &mut report).await;
        }

        if engine.memory.poll(now).is_some() {
            let started = Instant::now();
            let mut outcome = FamilyOutcome::default();
            let info = self.source.memory().await;
            let info = self.accept(components::MEMORY, info, &mut outcome);
            engine.memory.record(now, info);
            self.finish(components::MEMORY, started, outcome, &mut report).await;
        }

        if let Some(tick) = engine.disk.poll(now) {
            let started = Instant::now();
            let mut outcome = FamilyOutcome::default();
            let stats = self.source.disk_stats().await;
            let stats = self.accept(components::DISK, stats, &mut outcome);
            let added = engine.disk.record(now, tick, stats);
            self.logger.log_entities_discovered(components::DISK, &added);
            self.finish(components::DISK, started, outcome, &mut report).await;
        }

        if let Some(tick) = engine.net.poll(now) {
            let started = Instant::now();
            let mut outcome = FamilyOutcome::default();
            let stats = self.source.net_stats().await;
            let stats = self.accept(components::NET, stats, &mut outcome);
            let added = engine.net.record(now, tick, stats);
            self.logger.log_entities_discovered(components::NET, &added);
            self.finish(components::NET, started, outcome, &mut report).await;
        }

        if engine.storage.poll(now).is_some() {
            let started = Instant::now();
            let mut outcome = FamilyOutcome::default();
            self.collect_storage(&mut engine, now, &mut outcome).await;
            self.finish(components::STORAGE, started, outcome, &mut report).await;
        }

        if engine.temp.poll(now).is_some() {
            let started = Instant::now();
            let mut outcome = FamilyOutcome::default();
            let readings = self.source.temperatures().await;
            let readings = self.accept(components::TEMP, readings, &mut outcome);
            engine.temp.record(now, readings);
            self.finish(components::TEMP, started, outcome, &mut report).await;
        }

        if let Some(celsius) = engine.temp.sensor_report(now) {
            self.logger.log_sensor("temp.cpu", celsius, "°C");
        }

        for (family, count) in engine.entity_counts() {
            self.metrics.set_entities_tracked(family, count);
        }
        self.metrics.inc_collection_cycles();
        report
    }

    async fn collect_storage(&self, engine: &mut Engine, now: i64, outcome: &mut FamilyOutcome) {
        let entries = self.source.mounts().await;
        if let Some(entries) = self.accept(components::STORAGE, entries, outcome) {
            let changes = engine.storage.enumerate(now, &entries);
            for (change, mounts) in [
                ("added", &changes.added),
                ("replaced", &changes.replaced),
                ("dropped", &changes.dropped),
                ("removed", &changes.removed),
            ] {
                for mount in mounts {
                    self.logger.log_mount_changed(change, mount);
                }
            }
        }

        for mount in engine.storage.mount_paths() {
            let usage = self.source.fs_usage(&mount).await;
            let usage = self.accept(components::STORAGE, usage, outcome);
            engine.storage.record(now, &mount, usage);
        }
    }

    /// Turns a source result into a reading, accounting for the failure.
    ///
    /// A failure is logged once when a family starts failing, not on every
    /// cycle while it keeps failing.
    fn accept<T>(
        &self,
        family: &'static str,
        result: Result<T, SourceError>,
        outcome: &mut FamilyOutcome,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.metrics.inc_source_errors(family);
                if !self.failing.contains(family) && outcome.first_failure.is_none() {
                    self.logger.log_source_unavailable(family, &e);
                }
                outcome.first_failure.get_or_insert_with(|| e.to_string());
                None
            }
        }
    }

    async fn finish(
        &mut self,
        family: &'static str,
        started: Instant,
        outcome: FamilyOutcome,
        report: &mut CycleReport,
    ) {
        self.metrics
            .observe_collection_latency(family, started.elapsed().as_secs_f64());
        if outcome.first_failure.is_some() {
            self.failing.insert(family);
        } else if self.failing.remove(family) {
            info!(family = family, "Metric source recovered");
        }
        self.health.report_family(family, outcome.first_failure).await;
        report.sampled.push(family);
    }
}

/// Builder for creating the collection loop
pub struct CollectionLoopBuilder {
    source: Option<Arc<dyn HostSource>>,
    engine: Option<SharedEngine>,
    clock: Arc<dyn Clock>,
    health: Option<HealthRegistry>,
    host: String,
    config: CollectionConfig,
}

impl CollectionLoopBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            engine: None,
            clock: Arc::new(SystemClock),
            health: None,
            host: String::from("localhost"),
            config: CollectionConfig::default(),
        }
    }

    pub fn source(mut self, source: Arc<dyn HostSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn engine(mut self, engine: SharedEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Host name stamped on log events
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn tick(mut self, tick: Duration) -> Self {
        self.config.tick = tick;
        self
    }

    pub fn build(self) -> Result<CollectionLoop> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Host source is required"))?;
        let engine = self
            .engine
            .ok_or_else(|| anyhow::anyhow!("Engine is required"))?;
        if self.config.tick.is_zero() {
            anyhow::bail!("Collection tick must be positive");
        }

        Ok(CollectionLoop::new(
            source,
            engine,
            self.clock,
            self.health.unwrap_or_default(),
            StructuredLogger::new(self.host),
            self.config,
        ))
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

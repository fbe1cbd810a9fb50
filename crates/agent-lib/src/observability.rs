//! Self-observability of the metrics agent
//!
//! Provides:
//! - Prometheus metrics about collection and reporting
//! - Structured JSON log events with tracing

use crate::error::{Overflow, SourceError};
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Latency buckets in seconds; a cycle is a handful of small file reads
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25,
];

/// Registered once per process. `None` when registration failed, in which
/// case every recording is a no-op.
static GLOBAL_METRICS: OnceLock<Option<AgentMetricsInner>> = OnceLock::new();

struct AgentMetricsInner {
    collection_latency_seconds: HistogramVec,
    report_latency_seconds: HistogramVec,
    source_errors: IntCounterVec,
    entities_tracked: IntGaugeVec,
    buffer_overflows: IntCounterVec,
    status_cache_hits: IntCounter,
    collection_cycles: IntCounter,
}

impl AgentMetricsInner {
    fn register() -> prometheus::Result<Self> {
        Ok(Self {
            collection_latency_seconds: register_histogram_vec!(
                "hostmetrics_collection_latency_seconds",
                "Time spent reading sources and recording one family",
                &["family"],
                LATENCY_BUCKETS.to_vec()
            )?,
            report_latency_seconds: register_histogram_vec!(
                "hostmetrics_report_latency_seconds",
                "Time spent rendering a report document",
                &["document"],
                LATENCY_BUCKETS.to_vec()
            )?,
            source_errors: register_int_counter_vec!(
                "hostmetrics_source_errors_total",
                "Kernel source reads that failed",
                &["family"]
            )?,
            entities_tracked: register_int_gauge_vec!(
                "hostmetrics_entities_tracked",
                "Entities currently tracked per family",
                &["family"]
            )?,
            buffer_overflows: register_int_counter_vec!(
                "hostmetrics_buffer_overflows_total",
                "Reports truncated because the output buffer was full",
                &["document"]
            )?,
            status_cache_hits: register_int_counter!(
                "hostmetrics_status_cache_hits_total",
                "Status requests served from the cached document"
            )?,
            collection_cycles: register_int_counter!(
                "hostmetrics_collection_cycles_total",
                "Completed collection cycles"
            )?,
        })
    }
}

/// Handle to the process-wide Prometheus metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(|| match AgentMetricsInner::register() {
            Ok(inner) => Some(inner),
            Err(e) => {
                warn!(error = %e, "Failed to register Prometheus metrics");
                None
            }
        });
        Self { _private: () }
    }

    fn inner(&self) -> Option<&AgentMetricsInner> {
        GLOBAL_METRICS.get().and_then(Option::as_ref)
    }

    pub fn observe_collection_latency(&self, family: &str, duration_secs: f64) {
        if let Some(m) = self.inner() {
            m.collection_latency_seconds
                .with_label_values(&[family])
                .observe(duration_secs);
        }
    }

    pub fn observe_report_latency(&self, document: &str, duration_secs: f64) {
        if let Some(m) = self.inner() {
            m.report_latency_seconds
                .with_label_values(&[document])
                .observe(duration_secs);
        }
    }

    pub fn inc_source_errors(&self, family: &str) {
        if let Some(m) = self.inner() {
            m.source_errors.with_label_values(&[family]).inc();
        }
    }

    pub fn set_entities_tracked(&self, family: &str, count: usize) {
        if let Some(m) = self.inner() {
            m.entities_tracked
                .with_label_values(&[family])
                .set(i64::try_from(count).unwrap_or(i64::MAX));
        }
    }

    pub fn inc_buffer_overflows(&self, document: &str) {
        if let Some(m) = self.inner() {
            m.buffer_overflows.with_label_values(&[document]).inc();
        }
    }

    pub fn inc_status_cache_hits(&self) {
        if let Some(m) = self.inner() {
            m.status_cache_hits.inc();
        }
    }

    pub fn inc_collection_cycles(&self) {
        if let Some(m) = self.inner() {
            m.collection_cycles.inc();
        }
    }
}

/// Structured logger for agent events
///
/// Every record carries an `event` field naming what happened and the
/// `host` it happened on.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    host: String,
}

impl StructuredLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn log_startup(&self, version: &str, api_port: u16) {
        info!(
            event = "agent_started",
            host = %self.host,
            agent_version = %version,
            api_port = api_port,
            "Host metrics agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            host = %self.host,
            reason = %reason,
            "Host metrics agent shutting down"
        );
    }

    /// A report was truncated. Not fatal: the document is still valid.
    pub fn log_buffer_overflow(&self, document: &str, capacity: usize, overflow: &Overflow) {
        warn!(
            event = "buffer_overflow",
            host = %self.host,
            document = %document,
            capacity = capacity,
            requested = overflow.requested,
            remaining = overflow.remaining,
            "Report truncated at buffer capacity"
        );
    }

    pub fn log_source_unavailable(&self, family: &str, error: &SourceError) {
        warn!(
            event = "source_unavailable",
            host = %self.host,
            family = %family,
            error = %error,
            "Metric source unavailable, recording zero"
        );
    }

    pub fn log_entities_discovered(&self, family: &str, names: &[String]) {
        if names.is_empty() {
            return;
        }
        info!(
            event = "entities_discovered",
            host = %self.host,
            family = %family,
            count = names.len(),
            names = ?names,
            "Discovered entities"
        );
    }

    /// `change` is one of `added`, `replaced`, `dropped` or `removed`.
    pub fn log_mount_changed(&self, change: &str, mount: &str) {
        if change == "dropped" {
            warn!(
                event = "mount_changed",
                host = %self.host,
                change = %change,
                mount = %mount,
                "Mount table full, mount not tracked"
            );
        } else {
            info!(
                event = "mount_changed",
                host = %self.host,
                change = %change,
                mount = %mount,
                "Mount table changed"
            );
        }
    }

    /// Periodic sensor record for downstream log consumers.
    pub fn log_sensor(&self, sensor: &str, value: i64, unit: &str) {
        info!(
            event = "sensor",
            host = %self.host,
            sensor = %sensor,
            value = value,
            unit = %unit,
            "Sensor reading"
        );
    }
}

//! Status and details documents
//!
//! ```text
//! {"host":H,"timestamp":NOW,"metrics":{"period":300,<families>}}
//! {"host":H,"timestamp":NOW,"metrics":{"start":S,"period":300,<families>}}
//! ```

use crate::engine::clock::Clock;
use crate::engine::writer::{quote, JsonWriter};
use crate::engine::{Engine, SharedEngine, RETENTION_SECS};
use crate::error::Overflow;
use crate::observability::{AgentMetrics, StructuredLogger};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// A rendered document and the overflow that truncated it, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub body: String,
    pub overflow: Option<Overflow>,
}

impl Rendered {
    fn finish(w: JsonWriter, result: Result<bool, Overflow>) -> Self {
        let body = if w.is_empty() {
            String::from("{}")
        } else {
            w.into_string()
        };
        Self {
            body,
            overflow: result.err(),
        }
    }
}

pub fn render_status(engine: &mut Engine, host: &str, now: i64, capacity: usize) -> Rendered {
    let mut w = JsonWriter::new(capacity);
    let result = w.root(|w| {
        w.member("host", &quote(host))?;
        w.member("timestamp", &now.to_string())?;
        w.object("metrics", |w| {
            w.member("period", &RETENTION_SECS.to_string())?;
            engine.status(w, now)
        })?;
        Ok(())
    });
    Rendered::finish(w, result)
}

/// Renders every sample taken at or after `since`, but no earlier than one
/// retention window ago.
pub fn render_details(
    engine: &Engine,
    host: &str,
    now: i64,
    since: Option<i64>,
    capacity: usize,
) -> Rendered {
    let start = since.unwrap_or(0).max(now - RETENTION_SECS);
    let mut w = JsonWriter::new(capacity);
    let result = w.root(|w| {
        w.member("host", &quote(host))?;
        w.member("timestamp", &now.to_string())?;
        w.object("metrics", |w| {
            w.member("start", &start.to_string())?;
            w.member("period", &RETENTION_SECS.to_string())?;
            engine.details(w, now, start)
        })?;
        Ok(())
    });
    Rendered::finish(w, result)
}

/// Last status document, reused while younger than the time to live
#[derive(Debug, Clone)]
pub struct StatusCache {
    ttl: i64,
    entry: Option<(i64, Arc<str>)>,
}

impl StatusCache {
    /// A zero `ttl` disables caching.
    pub fn new(ttl: i64) -> Self {
        Self { ttl, entry: None }
    }

    pub fn get(&self, now: i64) -> Option<Arc<str>> {
        match &self.entry {
            Some((rendered_at, body)) if now >= *rendered_at && now - rendered_at < self.ttl => {
                Some(Arc::clone(body))
            }
            _ => None,
        }
    }

    pub fn store(&mut self, now: i64, body: Arc<str>) {
        self.entry = Some((now, body));
    }
}

/// Serves report documents from the shared engine
pub struct Reporter {
    engine: SharedEngine,
    clock: Arc<dyn Clock>,
    host: String,
    capacity: usize,
    cache: Mutex<StatusCache>,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl Reporter {
    pub fn new(
        engine: SharedEngine,
        clock: Arc<dyn Clock>,
        host: impl Into<String>,
        capacity: usize,
        cache_ttl: i64,
    ) -> Self {
        let host = host.into();
        Self {
            engine,
            clock,
            logger: StructuredLogger::new(host.clone()),
            host,
            capacity,
            cache: Mutex::new(StatusCache::new(cache_ttl)),
            metrics: AgentMetrics::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn status(&self) -> Arc<str> {
        let now = self.clock.now();
        let mut cache = self.cache.lock().await;
        if let Some(body) = cache.get(now) {
            self.metrics.inc_status_cache_hits();
            return body;
        }

        let started = Instant::now();
        let rendered = {
            let mut engine = self.engine.lock().await;
            render_status(&mut engine, &self.host, now, self.capacity)
        };
        self.metrics
            .observe_report_latency("status", started.elapsed().as_secs_f64());
        self.note_overflow("status", &rendered);

        let body: Arc<str> = Arc::from(rendered.body);
        cache.store(now, Arc::clone(&body));
        body
    }

    pub async fn details(&self, since: Option<i64>) -> String {
        let now = self.clock.now();
        let started = Instant::now();
        let rendered = {
            let engine = self.engine.lock().await;
            render_details(&engine, &self.host, now, since, self.capacity)
        };
        self.metrics
            .observe_report_latency("details", started.elapsed().as_secs_f64());
        self.note_overflow("details", &rendered);
        rendered.body
    }

    fn note_overflow(&self, document: &str, rendered: &Rendered) {
        if let Some(overflow) = &rendered.overflow {
            self.metrics.inc_buffer_overflows(document);
            self.logger
                .log_buffer_overflow(document, self.capacity, overflow);
        }
    }
}

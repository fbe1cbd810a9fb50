//! Integration tests for the agent API endpoints

use agent_lib::{
    collector::{CollectionLoopBuilder, HostSource},
    engine::{Clock, Engine, ManualClock, SharedEngine, Tick},
    health::{components, HealthRegistry},
    models::{
        CpuTimes, DiskStats, FsUsage, LoadAverage, MemInfo, MountEntry, NetStats, Temperatures,
    },
    observability::AgentMetrics,
    report::Reporter,
    SourceError,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use hostmetrics_agent::api::{create_router, AppState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

const T0: i64 = 1_700_000_000;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    engine: SharedEngine,
    clock: Arc<ManualClock>,
}

fn setup_test_app_with(health_registry: HealthRegistry, capacity: usize) -> TestApp {
    let engine = Engine::new().shared();
    let clock = Arc::new(ManualClock::new(T0));
    let reporter = Reporter::new(engine.clone(), clock.clone(), "test-host", capacity, 10);
    let state = Arc::new(AppState::new(reporter, health_registry));
    TestApp {
        router: create_router(state.clone()),
        state,
        engine,
        clock,
    }
}

async fn setup_test_app() -> TestApp {
    setup_test_app_with(HealthRegistry::with_families().await, 65536)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = get(router, uri).await;
    (status, serde_json::from_str(&body).unwrap())
}

fn cpu(busy: u64, idle: u64) -> CpuTimes {
    CpuTimes {
        user: busy,
        idle,
        ..CpuTimes::default()
    }
}

async fn record_cpu(engine: &SharedEngine) {
    let mut engine = engine.lock().await;
    engine.cpu.record(T0, Tick::Bootstrap, Some(cpu(0, 0)), None);
    engine
        .cpu
        .record(T0 + 5, Tick::Sample, Some(cpu(25, 75)), None);
    engine
        .cpu
        .record(T0 + 10, Tick::Sample, Some(cpu(50, 150)), None);
}

#[tokio::test]
async fn test_status_document() {
    let app = setup_test_app().await;
    record_cpu(&app.engine).await;
    app.clock.set(T0 + 10);

    let (status, content_type, body) = get(&app.router, "/metrics/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));

    let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["host"], "test-host");
    assert_eq!(doc["timestamp"], T0 + 10);
    assert_eq!(doc["metrics"]["period"], 300);
    assert_eq!(doc["metrics"]["cpu"]["busy"], serde_json::json!([25, "%"]));
}

#[tokio::test]
async fn test_status_is_cached() {
    let app = setup_test_app().await;

    let (_, first) = get_json(&app.router, "/metrics/status").await;
    assert!(first["metrics"].get("cpu").is_none());

    record_cpu(&app.engine).await;
    app.clock.advance(5);
    let (_, cached) = get_json(&app.router, "/metrics/status").await;
    assert_eq!(cached, first);

    app.clock.advance(5);
    let (_, fresh) = get_json(&app.router, "/metrics/status").await;
    assert_eq!(fresh["timestamp"], T0 + 10);
    assert!(fresh["metrics"]["cpu"]["busy"].is_array());
}

#[tokio::test]
async fn test_details_since() {
    let app = setup_test_app().await;
    record_cpu(&app.engine).await;
    app.clock.set(T0 + 10);

    let (status, doc) = get_json(&app.router, "/metrics/details").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["metrics"]["start"], T0 + 10 - 300);
    assert_eq!(doc["metrics"]["period"], 300);
    assert_eq!(
        doc["metrics"]["cpu"]["busy"],
        serde_json::json!([T0 + 5, 25, T0 + 10, 25, "%"])
    );

    let uri = format!("/metrics/details?since={}", T0 + 10);
    let (_, doc) = get_json(&app.router, &uri).await;
    assert_eq!(doc["metrics"]["start"], T0 + 10);
    assert_eq!(
        doc["metrics"]["cpu"]["busy"],
        serde_json::json!([T0 + 10, 25, "%"])
    );
}

#[tokio::test]
async fn test_details_rejects_malformed_since() {
    let app = setup_test_app().await;
    let (status, _, _) = get(&app.router, "/metrics/details?since=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_small_buffer_still_returns_valid_json() {
    let app = setup_test_app_with(HealthRegistry::with_families().await, 256);
    {
        let mut engine = app.engine.lock().await;
        let disks: Vec<DiskStats> = (0..26u8)
            .map(|i| DiskStats {
                major: 8,
                minor: u32::from(i) * 16,
                name: format!("sd{}", char::from(b'a' + i)),
                reads: 0,
                read_ms: 0,
                writes: 0,
                write_ms: 0,
            })
            .collect();
        engine.disk.record(T0, Tick::Bootstrap, Some(disks.clone()));
        let busy = disks
            .into_iter()
            .map(|d| DiskStats {
                reads: 100,
                writes: 100,
                ..d
            })
            .collect();
        engine.disk.record(T0 + 5, Tick::Sample, Some(busy));
    }
    app.clock.set(T0 + 5);

    let (status, _, body) = get(&app.router, "/metrics/details").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.len() <= 256);
    let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["host"], "test-host");
}

#[tokio::test]
async fn test_healthz_reflects_family_health() {
    let app = setup_test_app().await;

    let (status, health) = get_json(&app.router, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    for name in components::ALL {
        assert!(health["components"][name].is_object(), "{name} missing");
    }

    app.state
        .health_registry
        .set_degraded(components::TEMP, "no sensor readable")
        .await;
    let (status, health) = get_json(&app.router, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");

    app.state
        .health_registry
        .set_unhealthy(components::DISK, "failed")
        .await;
    let (status, health) = get_json(&app.router, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz() {
    let app = setup_test_app().await;

    let (status, readiness) = get_json(&app.router, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    app.state.health_registry.set_ready(true).await;
    let (status, readiness) = get_json(&app.router, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let app = setup_test_app().await;
    let metrics = AgentMetrics::new();
    metrics.observe_collection_latency("cpu", 0.0002);
    metrics.set_entities_tracked("disk", 2);

    let (status, content_type, text) = get(&app.router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().contains("text/plain"));
    assert!(text.contains("hostmetrics_collection_latency_seconds_bucket"));
    assert!(text.contains("hostmetrics_entities_tracked"));
}

/// Source with counters that grow on every read
struct SyntheticSource {
    reads: AtomicU64,
}

#[async_trait]
impl HostSource for SyntheticSource {
    async fn cpu_times(&self) -> Result<CpuTimes, SourceError> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(cpu(40 * n, 60 * n))
    }

    async fn load_average(&self) -> Result<LoadAverage, SourceError> {
        Ok(LoadAverage {
            load1: 100,
            load5: 50,
            load15: 25,
        })
    }

    async fn memory(&self) -> Result<MemInfo, SourceError> {
        Ok(MemInfo {
            total_kb: 1024 * 1024,
            available_kb: 256 * 1024,
            ..MemInfo::default()
        })
    }

    async fn disk_stats(&self) -> Result<Vec<DiskStats>, SourceError> {
        Ok(Vec::new())
    }

    async fn net_stats(&self) -> Result<Vec<NetStats>, SourceError> {
        Ok(Vec::new())
    }

    async fn mounts(&self) -> Result<Vec<MountEntry>, SourceError> {
        Ok(vec![MountEntry {
            device: "/dev/vda1".to_string(),
            mount: "/".to_string(),
            fs: "ext4".to_string(),
        }])
    }

    async fn fs_usage(&self, _mount: &str) -> Result<FsUsage, SourceError> {
        Ok(FsUsage {
            total_bytes: 10 << 30,
            available_bytes: 4 << 30,
        })
    }

    async fn temperatures(&self) -> Result<Temperatures, SourceError> {
        Ok(Temperatures::default())
    }
}

#[tokio::test]
async fn test_collection_cycles_feed_the_api() {
    let app = setup_test_app().await;
    let mut collection_loop = CollectionLoopBuilder::new()
        .source(Arc::new(SyntheticSource {
            reads: AtomicU64::new(0),
        }))
        .engine(app.engine.clone())
        .clock(app.clock.clone() as Arc<dyn Clock>)
        .health(app.state.health_registry.clone())
        .build()
        .unwrap();

    collection_loop.run_cycle().await;
    app.clock.advance(5);
    collection_loop.run_cycle().await;

    let (_, doc) = get_json(&app.router, "/metrics/status").await;
    let metrics = &doc["metrics"];
    assert_eq!(metrics["cpu"]["busy"], serde_json::json!([40, "%"]));
    assert_eq!(metrics["cpu"]["load"], serde_json::json!([100, 50, 25, 0]));
    assert_eq!(metrics["memory"]["used"], serde_json::json!([75, "%"]));
    assert_eq!(
        metrics["storage"]["/"],
        serde_json::json!({"size": [10240, "MB"], "free": [4096, "MB"]})
    );
    assert!(metrics.get("temp").is_none());
}

#[tokio::test]
async fn test_served_over_tcp() {
    let app = setup_test_app().await;
    record_cpu(&app.engine).await;
    app.clock.set(T0 + 10);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app.router).await.unwrap();
    });

    let response = reqwest::get(format!("http://{addr}/metrics/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let doc: serde_json::Value = response.json().await.unwrap();
    assert_eq!(doc["metrics"]["cpu"]["busy"], serde_json::json!([25, "%"]));

    server.abort();
}

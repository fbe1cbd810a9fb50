//! Host metrics agent
//!
//! Samples kernel resource counters on each family's cadence and serves a
//! rolling five minute summary and detail view over HTTP.

use agent_lib::{
    collector::{create_source, CollectionLoopBuilder},
    engine::{Clock, Engine, SystemClock},
    health::HealthRegistry,
    observability::StructuredLogger,
    report::Reporter,
};
use anyhow::Result;
use hostmetrics_agent::{api, config};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting hostmetrics");

    let config = config::AgentConfig::load()?;
    info!(
        host = %config.host_name,
        api_port = config.api_port,
        proc_root = %config.proc_root.display(),
        "Agent configured"
    );

    let health_registry = HealthRegistry::with_families().await;
    let logger = StructuredLogger::new(&config.host_name);
    logger.log_startup(AGENT_VERSION, config.api_port);

    let engine = Engine::new().shared();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let collection_loop = CollectionLoopBuilder::new()
        .source(create_source(&config.proc_root, &config.sys_root))
        .engine(engine.clone())
        .clock(clock.clone())
        .health(health_registry.clone())
        .host(config.host_name.clone())
        .tick(config.tick())
        .build()?;
    let collector_handle = tokio::spawn(collection_loop.run(shutdown_tx.subscribe()));

    let reporter = Reporter::new(
        engine,
        clock,
        config.host_name.clone(),
        config.buffer_capacity,
        config.status_cache_ttl(),
    );
    let app_state = Arc::new(api::AppState::new(reporter, health_registry));
    let mut api_shutdown = shutdown_tx.subscribe();
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    let reason = tokio::select! {
        reason = shutdown_signal() => reason,
        result = &mut api_handle => {
            match result {
                Ok(Ok(())) => "API server stopped",
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    "API server failed"
                }
                Err(e) => {
                    error!(error = %e, "API server task panicked");
                    "API server task panicked"
                }
            }
        }
    };

    logger.log_shutdown(reason);
    let _ = shutdown_tx.send(());
    if let Err(e) = collector_handle.await {
        error!(error = %e, "Collection loop task failed");
    }
    if !api_handle.is_finished() {
        let _ = api_handle.await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT received",
        _ = terminate => "SIGTERM received",
    }
}

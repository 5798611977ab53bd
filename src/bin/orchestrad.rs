//! Orchestration runtime daemon: loads configuration, hydrates durable
//! state, and serves the client HTTP surface.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use clap::Parser;
use orchestra_runtime::api::{router, AppState};
use orchestra_runtime::config::{Config, HttpEmbedder, HttpReasoner};
use orchestra_runtime::execution_log::ExecutionLog;
use orchestra_runtime::gc::GarbageCollector;
use orchestra_runtime::hub::ConnectionHub;
use orchestra_runtime::idempotency_store::IdempotencyStore;
use orchestra_runtime::plan_cache::PlanCache;
use orchestra_runtime::planner::Planner;
use orchestra_runtime::registry::WorkerRegistry;
use orchestra_runtime::resilience::BackoffPolicy;
use orchestra_runtime::scheduler::Scheduler;
use orchestra_runtime::store::Store;
use orchestra_runtime::webhook::WebhookDelivery;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "orchestrad")]
#[command(about = "Orchestration runtime control plane")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file; environment variables still win.
    #[arg(long, env = "ORCH_CONFIG_PATH")]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _cli = Cli::parse();
    let config = Config::load()?;
    orchestra_telemetry::init_tracing(config.raw.server.otlp_endpoint.as_deref());

    let store = Store::open(&config.raw.storage.path)?;

    let registry = Arc::new(WorkerRegistry::new(store.clone()));
    registry.hydrate()?;

    let embedder = Arc::new(HttpEmbedder::new(
        config.raw.embedder.base_url.clone(),
        config.raw.embedder.model_id.clone(),
        config.raw.embedder.api_key.clone(),
    ));
    let plan_cache = Arc::new(PlanCache::new(
        store.clone(),
        embedder,
        config.raw.embedder.similarity_threshold,
        config.raw.orchestration.plan_cache_retention_secs as i64,
    ));
    plan_cache.hydrate()?;

    let reasoner = Arc::new(HttpReasoner::new(
        config.raw.reasoner.base_url.clone(),
        config.raw.reasoner.model_id.clone(),
        config.raw.reasoner.api_key.clone(),
    ));
    let planner = Arc::new(Planner::new(reasoner, config.raw.orchestration.planner_max_attempts));

    let log = Arc::new(ExecutionLog::new(store.clone()));
    let idempotency = Arc::new(IdempotencyStore::new(
        store.clone(),
        config.raw.orchestration.task_timeout_secs as i64 * 4,
        config.raw.orchestration.idempotency_ttl_secs as i64,
    ));
    let hub = Arc::new(ConnectionHub::new(
        config.raw.hub.outbound_queue_capacity,
        config.raw.hub.missed_pings_before_unreachable,
        Duration::from_secs(config.raw.hub.ping_interval_secs),
    ));

    let task_backoff = BackoffPolicy::new(
        config.raw.retry.base_delay_ms,
        config.raw.retry.backoff_factor,
        config.raw.retry.max_delay_ms,
        config.raw.retry.jitter_ratio,
    );
    let scheduler = Arc::new(Scheduler::new(
        registry.clone(),
        hub.clone(),
        idempotency.clone(),
        log.clone(),
        task_backoff,
        config.raw.retry.max_retries,
        Duration::from_secs(config.raw.orchestration.task_timeout_secs),
        Duration::from_millis(200),
        Duration::from_secs(5),
    ));

    let webhook_backoff = BackoffPolicy::new(
        config.raw.webhook.base_delay_ms,
        2.0,
        config.raw.webhook.max_delay_ms,
        0.2,
    );
    let webhook = Arc::new(WebhookDelivery::new(webhook_backoff, config.raw.webhook.max_retries));

    Arc::new(GarbageCollector::new(idempotency.clone(), plan_cache.clone(), Duration::from_secs(300))).spawn();

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        registry,
        hub,
        idempotency,
        log,
        plan_cache,
        planner,
        scheduler,
        webhook,
        orchestrations: Arc::new(dashmap::DashMap::new()),
        compensation_failures: Arc::new(dashmap::DashMap::new()),
    });

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.raw.server.listen_port)).await?;
    tracing::info!(port = config.raw.server.listen_port, "orchestrad listening");
    axum::serve(listener, app).await?;
    Ok(())
}

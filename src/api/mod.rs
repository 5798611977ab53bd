//! Client HTTP surface (§6): submit actions, inspect orchestrations, register
//! workers, and manage compensation failures an operator must see.

pub mod handlers;
pub mod models;

use crate::config::Config;
use crate::domain::Orchestration;
use crate::execution_log::ExecutionLog;
use crate::hub::ConnectionHub;
use crate::idempotency_store::IdempotencyStore;
use crate::plan_cache::PlanCache;
use crate::planner::Planner;
use crate::registry::WorkerRegistry;
use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::webhook::WebhookDelivery;
use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use std::sync::Arc;

pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub registry: Arc<WorkerRegistry>,
    pub hub: Arc<ConnectionHub>,
    pub idempotency: Arc<IdempotencyStore>,
    pub log: Arc<ExecutionLog>,
    pub plan_cache: Arc<PlanCache>,
    pub planner: Arc<Planner>,
    pub scheduler: Arc<Scheduler>,
    pub webhook: Arc<WebhookDelivery>,
    pub orchestrations: Arc<DashMap<String, Orchestration>>,
    pub compensation_failures: Arc<DashMap<String, models::CompensationFailure>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/orchestrations", post(handlers::create_orchestration).get(handlers::list_orchestrations))
        .route("/orchestrations/:id", get(handlers::get_orchestration))
        .route("/workers/register", post(handlers::register_worker))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/compensation-failures",
            get(handlers::list_compensation_failures),
        )
        .route(
            "/compensation-failures/:key",
            get(handlers::inspect_compensation_failure).delete(handlers::ignore_compensation_failure),
        )
        .route(
            "/compensation-failures/:key/resolve",
            post(handlers::resolve_compensation_failure),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

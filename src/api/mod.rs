pub mod earnings;
pub mod health;
pub mod settlement;

use crate::db::Repository;
use crate::orchestration::Orchestrator;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { repo, orchestrator }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/settlement/run", post(settlement::run_settlement))
        .route("/v1/settlement/status", get(settlement::get_status))
        .route("/v1/settlement/runs", get(settlement::list_runs))
        .route("/v1/earnings", get(earnings::get_earnings))
        .route("/v1/earnings/export", get(earnings::export_earnings))
        .layer(cors)
        .with_state(state)
}

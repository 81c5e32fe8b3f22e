use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::services::{catalog::CatalogStore, recommendation::RecommendationService};

pub mod catalog;
pub mod recommendations;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogStore>,
    pub recommender: Arc<RecommendationService>,
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes(state))
}

/// API routes under /api/v1
fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/catalog", get(catalog::get_catalog))
        .route("/recommendations", post(recommendations::recommend))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub devices: usize,
    pub primary_estimator: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WelcomeResponse {
    pub message: String,
}

pub(crate) async fn healthz_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        devices: state.store.len().await,
        primary_estimator: state.engine.uses_primary(),
    })
}

pub(crate) async fn welcome() -> Json<WelcomeResponse> {
    tracing::info!("welcome requested");
    Json(WelcomeResponse {
        message: "Welcome to the battery digital twin API".to_string(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz_handler))
}

pub fn api_router() -> Router<AppState> {
    Router::new().route("/welcome", get(welcome))
}

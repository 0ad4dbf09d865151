pub mod auth;
pub mod health;
pub mod mode;
pub mod telemetry;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest(
            "/api",
            Router::new()
                .merge(health::api_router())
                .merge(telemetry::router())
                .merge(mode::router())
                .merge(auth::router()),
        )
        .with_state(state)
}

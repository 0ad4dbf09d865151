use crate::config::TwinConfig;
use crate::services::digital_twin::EstimationEngine;
use crate::state::AppState;
use crate::users::NewUser;

pub fn test_config() -> TwinConfig {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let data_root = tempdir.keep();

    TwinConfig {
        users_path: data_root.join("users.json"),
        mode_path: data_root.join("mode.txt"),
        primary_estimator_url: None,
        primary_estimator_timeout_ms: 2_000,
        session_ttl_hours: 24,
        session_prune_interval_seconds: 600,
        password_hash_iterations: 1_000,
    }
}

pub fn test_state() -> AppState {
    AppState::new(test_config(), EstimationEngine::fallback_only())
}

/// Adds a user whose password is `password`.
pub async fn register_user(
    state: &AppState,
    username: &str,
    role: &str,
    company: Option<&str>,
    battery_id: Option<&str>,
) {
    let password_hash = crate::auth::hash_password_with_iterations("password", 1_000)
        .expect("hash password");
    state
        .users
        .register(NewUser {
            username: username.to_string(),
            password_hash,
            company: company.map(str::to_string),
            role: Some(role.to_string()),
            battery_id: battery_id.map(str::to_string),
        })
        .await
        .expect("register user");
}

/// Serves a twin-engine stand-in on an ephemeral port and returns its estimate URL.
///
/// `GET` always answers so startup detection succeeds. `POST` answers with `status`;
/// on 200 it echoes `soc_percent` as `dte_km` and `soh_percent` as `soh_refined`.
pub async fn spawn_primary_stub(status: axum::http::StatusCode) -> String {
    use axum::routing::get;
    use axum::Json;
    use serde_json::{json, Value as JsonValue};

    let app = axum::Router::new().route(
        "/estimate",
        get(|| async { "twin engine" }).post(move |Json(body): Json<JsonValue>| async move {
            let reply = json!({
                "dte_km": body["soc_percent"],
                "soh_refined": body["soh_percent"],
                "health_estimate": "Good",
                "remaining_energy_wh": 1850.0,
                "source": "matlab_engine",
            });
            (status, Json(reply))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/estimate")
}

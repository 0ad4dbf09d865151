use axum::body::Bytes;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::error::{internal_error, AppError, AppResult};
use crate::mode::OperatingMode;
use crate::state::AppState;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct ModeResponse {
    pub(crate) mode: OperatingMode,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct SetModeResponse {
    pub(crate) status: String,
    pub(crate) mode: OperatingMode,
}

#[derive(Debug, serde::Deserialize)]
struct SetModeRequest {
    #[serde(default)]
    mode: Option<serde_json::Value>,
}

pub(crate) async fn get_mode(State(state): State<AppState>) -> Json<ModeResponse> {
    Json(ModeResponse {
        mode: state.mode.read().await,
    })
}

pub(crate) async fn set_mode(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<SetModeResponse>> {
    let request: SetModeRequest = serde_json::from_slice(&body)
        .map_err(|_| AppError::bad_request("Mode not specified"))?;
    let raw = request
        .mode
        .ok_or_else(|| AppError::bad_request("Mode not specified"))?;
    let mode = raw
        .as_str()
        .and_then(|value| value.parse::<OperatingMode>().ok())
        .ok_or_else(|| AppError::bad_request("Invalid mode"))?;

    state.mode.write(mode).await.map_err(|err| internal_error(format!("{err:#}")))?;
    tracing::info!(mode = %mode, "operating mode set");
    Ok(Json(SetModeResponse {
        status: "ok".to_string(),
        mode,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/mode", get(get_mode).post(set_mode))
}

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::telemetry::TelemetrySample;
use crate::users::Role;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct IngestAck {
    pub(crate) status: String,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub(crate) enum LatestResponse {
    Fleet(BTreeMap<String, Arc<TelemetrySample>>),
    Device(Arc<TelemetrySample>),
    Pending { message: String },
}

/// Absent and empty bodies are both "no body"; the device must send at least one field.
fn parse_record(body: &[u8]) -> AppResult<Map<String, JsonValue>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::bad_request("No JSON body provided"));
    }
    let value: JsonValue = serde_json::from_slice(body)
        .map_err(|_| AppError::bad_request("Malformed JSON body"))?;
    match value {
        JsonValue::Object(map) if !map.is_empty() => Ok(map),
        JsonValue::Object(_) | JsonValue::Null => {
            Err(AppError::bad_request("No JSON body provided"))
        }
        _ => Err(AppError::bad_request("Telemetry body must be a JSON object")),
    }
}

pub(crate) async fn receive_battery_data(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<IngestAck>> {
    let record = parse_record(&body)?;
    let sample = state.engine.estimate(record, Utc::now()).await;
    let battery_id = sample.battery_id.clone();
    tracing::debug!(
        battery_id = %battery_id,
        dte_km = sample.estimate.dte_km,
        source = %sample.estimate.estimation_source,
        "telemetry sample processed"
    );
    state.store.put(battery_id, sample).await;
    Ok(Json(IngestAck {
        status: "ok".to_string(),
    }))
}

pub(crate) async fn get_latest(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> AppResult<Json<LatestResponse>> {
    let user = state
        .users
        .find(&session.username)
        .await
        .ok_or_else(|| AppError::unauthorized("User not found"))?;

    match user.role() {
        Role::Company => {
            let ids = match user.company.as_deref() {
                Some(company) => state.users.battery_ids_for_company(company).await,
                // No company means no fleet; unaffiliated users are not grouped together.
                None => Vec::new(),
            };
            Ok(Json(LatestResponse::Fleet(state.store.get_all(&ids).await)))
        }
        Role::User => {
            let battery_id = user
                .battery_id
                .as_deref()
                .ok_or_else(|| AppError::not_found("No battery assigned to user"))?;
            match state.store.get(battery_id).await {
                Some(sample) => Ok(Json(LatestResponse::Device(sample))),
                None => Ok(Json(LatestResponse::Pending {
                    message: "No data yet for user's battery".to_string(),
                })),
            }
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/battery-data", post(receive_battery_data))
        .route("/latest", get(get_latest))
}

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;

use crate::auth::AuthUser;
use crate::error::{internal_error, AppError, AppResult};
use crate::state::AppState;
use crate::users::{NewUser, RegisterError};

#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct RegisterRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    battery_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) token: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct MeResponse {
    pub(crate) username: String,
    pub(crate) role: String,
    pub(crate) company: Option<String>,
    pub(crate) battery_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct LogoutResponse {
    pub(crate) status: String,
}

/// Absent, non-JSON or wrongly shaped bodies all answer with the same 400.
fn parse_body<T: DeserializeOwned>(body: &[u8], missing: &str) -> AppResult<T> {
    serde_json::from_slice(body).map_err(|_| AppError::bad_request(missing))
}

pub(crate) async fn login(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<TokenResponse>> {
    let payload: LoginRequest = parse_body(&body, "Missing credentials")?;
    let username = payload.username.trim().to_string();
    if username.is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("Missing credentials"));
    }

    let Some(user) = state.users.find(&username).await else {
        return Err(AppError::unauthorized("Invalid username or password"));
    };
    let password = payload.password;
    let hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || crate::auth::verify_password(&password, &hash))
        .await
        .map_err(internal_error)?;
    if !verified {
        if !crate::auth::is_supported_hash(&user.password_hash) {
            tracing::warn!(
                username = %user.username,
                "stored password hash uses an unsupported scheme; re-register the user"
            );
        }
        return Err(AppError::unauthorized("Invalid username or password"));
    }

    let token = state.auth.issue_for_user(&user.username).await;
    tracing::info!(username = %user.username, "user logged in");
    Ok(Json(TokenResponse { token }))
}

pub(crate) async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<TokenResponse>> {
    let payload: RegisterRequest = parse_body(&body, "Missing username or password")?;
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("Missing username or password"));
    }

    let iterations = state.config.password_hash_iterations;
    let password = payload.password;
    let password_hash = tokio::task::spawn_blocking(move || {
        crate::auth::hash_password_with_iterations(&password, iterations)
    })
    .await
    .map_err(internal_error)?
    .map_err(|err| AppError::bad_request(err.to_string()))?;

    let record = state
        .users
        .register(NewUser {
            username: payload.username,
            password_hash,
            company: payload.company,
            role: payload.role,
            battery_id: payload.battery_id,
        })
        .await
        .map_err(|err| match err {
            RegisterError::MissingUsername => AppError::bad_request("Missing username or password"),
            RegisterError::AlreadyExists => AppError::conflict("User already exists"),
            RegisterError::Storage(err) => internal_error(format!("{err:#}")),
        })?;

    let token = state.auth.issue_for_user(&record.username).await;
    Ok(Json(TokenResponse { token }))
}

pub(crate) async fn logout(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> Json<LogoutResponse> {
    state.auth.revoke(&session.token).await;
    Json(LogoutResponse {
        status: "ok".to_string(),
    })
}

pub(crate) async fn me(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> AppResult<Json<MeResponse>> {
    let user = state
        .users
        .find(&session.username)
        .await
        .ok_or_else(|| AppError::unauthorized("User not found"))?;
    Ok(Json(MeResponse {
        role: user.role().as_str().to_string(),
        username: user.username,
        company: user.company,
        battery_id: user.battery_id,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

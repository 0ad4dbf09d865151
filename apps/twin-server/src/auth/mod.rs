mod password;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::AppError;

pub use password::{
    hash_password_with_iterations, is_supported_hash, verify_password, DEFAULT_ITERATIONS,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub username: String,
    pub token: String,
}

#[derive(Debug)]
struct SessionEntry {
    username: String,
    expires_at: DateTime<Utc>,
}

/// In-memory bearer sessions. Tokens do not survive a restart.
#[derive(Debug)]
pub struct AuthManager {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    ttl: ChronoDuration,
}

impl AuthManager {
    pub fn new(token_ttl_hours: i64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: ChronoDuration::hours(token_ttl_hours),
        }
    }

    pub async fn issue_for_user(&self, username: &str) -> String {
        let mut buf = [0u8; 32];
        OsRng.fill_bytes(&mut buf);
        let token = URL_SAFE_NO_PAD.encode(buf);
        let expires_at = Utc::now() + self.ttl;
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            token.clone(),
            SessionEntry {
                username: username.to_string(),
                expires_at,
            },
        );
        token
    }

    pub async fn resolve(&self, token: &str) -> Option<String> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get(token)?;
        if entry.expires_at <= Utc::now() {
            sessions.remove(token);
            return None;
        }
        Some(entry.username.clone())
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    pub async fn prune_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.expires_at > now);
        before - sessions.len()
    }
}

/// Extractor for routes that need a signed-in principal.
#[derive(Debug, Clone)]
pub struct AuthUser(pub SessionUser);

impl<S> FromRequestParts<S> for AuthUser
where
    Arc<AuthManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let manager = Arc::<AuthManager>::from_ref(state);
        let token_result: Result<String, AppError> = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::unauthorized("Authentication required"));

        async move {
            let token = token_result?;
            let username = manager
                .resolve(&token)
                .await
                .ok_or_else(|| AppError::unauthorized("Authentication required"))?;
            Ok(AuthUser(SessionUser { username, token }))
        }
    }
}

use crate::auth::AuthManager;
use crate::config::TwinConfig;
use crate::mode::ModeSignal;
use crate::services::digital_twin::EstimationEngine;
use crate::services::latest_store::LatestStateStore;
use crate::users::UserRepository;
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: TwinConfig,
    pub auth: Arc<AuthManager>,
    pub users: Arc<UserRepository>,
    pub engine: Arc<EstimationEngine>,
    pub store: Arc<LatestStateStore>,
    pub mode: ModeSignal,
}

impl AppState {
    pub fn new(config: TwinConfig, engine: EstimationEngine) -> Self {
        Self {
            auth: Arc::new(AuthManager::new(config.session_ttl_hours)),
            users: Arc::new(UserRepository::new(config.users_path.clone())),
            engine: Arc::new(engine),
            store: Arc::new(LatestStateStore::new()),
            mode: ModeSignal::new(config.mode_path.clone()),
            config,
        }
    }
}

impl FromRef<AppState> for Arc<AuthManager> {
    fn from_ref(state: &AppState) -> Arc<AuthManager> {
        state.auth.clone()
    }
}

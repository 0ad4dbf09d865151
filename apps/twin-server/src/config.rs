use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_USERS_PATH: &str = "users.json";
const DEFAULT_MODE_PATH: &str = "mode.txt";
const DEFAULT_PRIMARY_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
const DEFAULT_SESSION_PRUNE_INTERVAL_SECONDS: u64 = 600;

/// Optional JSON file whose values sit between the built-in defaults and the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ConfigOverrides {
    #[serde(default)]
    users_path: Option<String>,
    #[serde(default)]
    mode_path: Option<String>,
    #[serde(default)]
    primary_estimator_url: Option<String>,
    #[serde(default)]
    primary_estimator_timeout_ms: Option<u64>,
    #[serde(default)]
    session_ttl_hours: Option<i64>,
    #[serde(default)]
    session_prune_interval_seconds: Option<u64>,
    #[serde(default)]
    password_hash_iterations: Option<u32>,
}

fn load_config_overrides(path: &Path) -> Option<ConfigOverrides> {
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read config overrides; using env defaults"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse config overrides; using env defaults"
            );
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct TwinConfig {
    pub users_path: PathBuf,
    pub mode_path: PathBuf,
    pub primary_estimator_url: Option<String>,
    pub primary_estimator_timeout_ms: u64,
    pub session_ttl_hours: i64,
    pub session_prune_interval_seconds: u64,
    pub password_hash_iterations: u32,
}

impl TwinConfig {
    pub fn from_env() -> Result<Self> {
        let overrides = env_optional_string("TWIN_CONFIG_PATH")
            .map(PathBuf::from)
            .and_then(|path| load_config_overrides(&path));
        Self::resolve(env_optional_string, overrides.unwrap_or_default())
    }

    /// Precedence: environment, then the overrides file, then built-in defaults.
    pub(crate) fn resolve(
        env: impl Fn(&str) -> Option<String>,
        overrides: ConfigOverrides,
    ) -> Result<Self> {
        let users_path = PathBuf::from(
            env("TWIN_USERS_PATH")
                .or(non_blank(overrides.users_path))
                .unwrap_or_else(|| DEFAULT_USERS_PATH.to_string()),
        );
        let mode_path = PathBuf::from(
            env("TWIN_MODE_PATH")
                .or(non_blank(overrides.mode_path))
                .unwrap_or_else(|| DEFAULT_MODE_PATH.to_string()),
        );

        let primary_estimator_url = env("TWIN_PRIMARY_ESTIMATOR_URL")
            .or(non_blank(overrides.primary_estimator_url));
        if let Some(url) = primary_estimator_url.as_deref() {
            url::Url::parse(url)
                .with_context(|| format!("invalid TWIN_PRIMARY_ESTIMATOR_URL {url:?}"))?;
        }

        let primary_estimator_timeout_ms = parse_env(&env, "TWIN_PRIMARY_ESTIMATOR_TIMEOUT_MS")?
            .or(overrides.primary_estimator_timeout_ms)
            .unwrap_or(DEFAULT_PRIMARY_TIMEOUT_MS)
            .clamp(50, 60_000);
        let session_ttl_hours = parse_env(&env, "TWIN_SESSION_TTL_HOURS")?
            .or(overrides.session_ttl_hours)
            .unwrap_or(DEFAULT_SESSION_TTL_HOURS)
            .max(1);
        let session_prune_interval_seconds =
            parse_env(&env, "TWIN_SESSION_PRUNE_INTERVAL_SECONDS")?
                .or(overrides.session_prune_interval_seconds)
                .unwrap_or(DEFAULT_SESSION_PRUNE_INTERVAL_SECONDS)
                .max(10);
        let password_hash_iterations = parse_env(&env, "TWIN_PASSWORD_HASH_ITERATIONS")?
            .or(overrides.password_hash_iterations)
            .unwrap_or(crate::auth::DEFAULT_ITERATIONS)
            .max(1);

        Ok(Self {
            users_path,
            mode_path,
            primary_estimator_url,
            primary_estimator_timeout_ms,
            session_ttl_hours,
            session_prune_interval_seconds,
            password_hash_iterations,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env(key)
        .map(|raw| raw.parse::<T>().with_context(|| format!("invalid {key}")))
        .transpose()
}

fn env_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

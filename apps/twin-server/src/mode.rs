use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    #[default]
    Driving,
    Charging,
}

impl OperatingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driving => "driving",
            Self::Charging => "charging",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown operating mode {0:?}")]
pub struct UnknownMode(pub String);

impl FromStr for OperatingMode {
    type Err = UnknownMode;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "driving" => Ok(Self::Driving),
            "charging" => Ok(Self::Charging),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Shared operating mode persisted as a one-word text file.
///
/// Last write wins and there is no change notification; pollers may see a stale
/// value for up to one polling interval.
#[derive(Debug, Clone)]
pub struct ModeSignal {
    path: PathBuf,
}

impl ModeSignal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: anything other than a readable, known value yields the default.
    pub async fn read(&self) -> OperatingMode {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => match contents.parse::<OperatingMode>() {
                Ok(mode) => mode,
                Err(err) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %err,
                        "mode file holds an unknown value; assuming default"
                    );
                    OperatingMode::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => OperatingMode::default(),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to read mode file; assuming default"
                );
                OperatingMode::default()
            }
        }
    }

    pub async fn write(&self, mode: OperatingMode) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        // Readers only ever see a complete file: write a sibling, then rename over.
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, mode.as_str())
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        if let Err(err) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err)
                .with_context(|| format!("failed to replace mode file {}", self.path.display()));
        }
        Ok(())
    }

    /// Unique per write so the server and the simulator console never share a temp file.
    fn tmp_path(&self) -> PathBuf {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "mode".into());
        name.push(format!(".{suffix}.tmp"));
        self.path.with_file_name(name)
    }
}

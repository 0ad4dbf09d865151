use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sees every device assigned to anyone in the same company.
    Company,
    /// Sees only their own assigned device.
    User,
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("company") {
            Self::Company
        } else {
            Self::User
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub password_hash: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub battery_id: Option<String>,
}

impl UserRecord {
    pub fn role(&self) -> Role {
        self.role.as_deref().map(Role::parse).unwrap_or(Role::User)
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub company: Option<String>,
    pub role: Option<String>,
    pub battery_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("username is required")]
    MissingUsername,
    #[error("user already exists")]
    AlreadyExists,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Users and their device assignments, kept as a JSON array in one file.
///
/// The file is re-read on every lookup so out-of-band edits show up immediately.
/// Writes are serialized in-process only.
#[derive(Debug)]
pub struct UserRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl UserRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files read as an empty list.
    pub async fn load(&self) -> Vec<UserRecord> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to read users file");
                return Vec::new();
            }
        };
        match serde_json::from_slice(&contents) {
            Ok(users) => users,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to parse users file");
                Vec::new()
            }
        }
    }

    pub async fn find(&self, username: &str) -> Option<UserRecord> {
        self.load()
            .await
            .into_iter()
            .find(|user| user.username == username)
    }

    /// Distinct device ids assigned to any user of `company`, sorted.
    pub async fn battery_ids_for_company(&self, company: &str) -> Vec<String> {
        let ids: BTreeSet<String> = self
            .load()
            .await
            .into_iter()
            .filter(|user| user.company.as_deref() == Some(company))
            .filter_map(|user| user.battery_id)
            .filter(|id| !id.is_empty())
            .collect();
        ids.into_iter().collect()
    }

    pub async fn register(&self, new_user: NewUser) -> Result<UserRecord, RegisterError> {
        let username = new_user.username.trim().to_string();
        if username.is_empty() {
            return Err(RegisterError::MissingUsername);
        }

        let _guard = self.write_lock.lock().await;
        let mut users = self.load().await;
        if users.iter().any(|user| user.username == username) {
            return Err(RegisterError::AlreadyExists);
        }

        let record = UserRecord {
            username,
            password_hash: new_user.password_hash,
            company: non_empty(new_user.company),
            role: Some(
                new_user
                    .role
                    .as_deref()
                    .map(Role::parse)
                    .unwrap_or(Role::User)
                    .as_str()
                    .to_string(),
            ),
            battery_id: non_empty(new_user.battery_id),
        };
        users.push(record.clone());
        self.save(&users).await?;
        tracing::info!(username = %record.username, role = record.role().as_str(), "user registered");
        Ok(record)
    }

    async fn save(&self, users: &[UserRecord]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(users).context("failed to encode users")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, company: Option<&str>, role: &str, battery: Option<&str>) -> NewUser {
        NewUser {
            username: username.to_string(),
            password_hash: "pbkdf2:sha256:1$salt$00".to_string(),
            company: company.map(str::to_string),
            role: Some(role.to_string()),
            battery_id: battery.map(str::to_string),
        }
    }

    #[test]
    fn role_parsing_is_lenient() {
        assert_eq!(Role::parse("company"), Role::Company);
        assert_eq!(Role::parse(" Company "), Role::Company);
        assert_eq!(Role::parse("user"), Role::User);
        assert_eq!(Role::parse("admin"), Role::User);
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = UserRepository::new(dir.path().join("users.json"));
        assert!(repo.load().await.is_empty());
        assert!(repo.find("alice").await.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(UserRepository::new(path).load().await.is_empty());
    }

    #[tokio::test]
    async fn register_then_find_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = UserRepository::new(dir.path().join("users.json"));
        repo.register(new_user("alice", Some("acme"), "user", Some("B1")))
            .await
            .unwrap();

        let reopened = UserRepository::new(repo.path().to_path_buf());
        let alice = reopened.find("alice").await.expect("alice");
        assert_eq!(alice.company.as_deref(), Some("acme"));
        assert_eq!(alice.battery_id.as_deref(), Some("B1"));
        assert_eq!(alice.role(), Role::User);
    }

    #[tokio::test]
    async fn duplicate_usernames_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = UserRepository::new(dir.path().join("users.json"));
        repo.register(new_user("bob", None, "user", None)).await.unwrap();
        let err = repo
            .register(new_user("bob", None, "user", None))
            .await
            .unwrap_err();
        assert!(matches!(err, RegisterError::AlreadyExists));
    }

    #[tokio::test]
    async fn company_lookup_dedupes_and_ignores_unassigned() {
        let dir = tempfile::tempdir().unwrap();
        let repo = UserRepository::new(dir.path().join("users.json"));
        repo.register(new_user("boss", Some("acme"), "company", None)).await.unwrap();
        repo.register(new_user("u1", Some("acme"), "user", Some("B2"))).await.unwrap();
        repo.register(new_user("u2", Some("acme"), "user", Some("B1"))).await.unwrap();
        repo.register(new_user("u3", Some("acme"), "user", Some("B2"))).await.unwrap();
        repo.register(new_user("u4", Some("other"), "user", Some("B9"))).await.unwrap();
        repo.register(new_user("u5", Some("acme"), "user", Some("  "))).await.unwrap();

        assert_eq!(repo.battery_ids_for_company("acme").await, vec!["B1", "B2"]);
        assert_eq!(repo.battery_ids_for_company("nobody").await, Vec::<String>::new());
        assert_eq!(repo.find("boss").await.unwrap().role(), Role::Company);
    }

    #[tokio::test]
    async fn reads_files_written_by_other_tools() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(
            &path,
            r#"[{"username": "carol", "password_hash": "x", "company": null, "role": "user", "battery_id": "EV48V_SIM_01"}]"#,
        )
        .unwrap();
        let carol = UserRepository::new(path).find("carol").await.unwrap();
        assert_eq!(carol.battery_id.as_deref(), Some("EV48V_SIM_01"));
        assert!(carol.company.is_none());
    }
}

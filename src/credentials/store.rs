//! Registry credential store
//!
//! Persists per-registry logins as `{"auths": {"<host>": {...}}}`. Writes go
//! through a temporary file and a rename; the file is kept at mode 0600.

use crate::error::{CracError, CracResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Key under which all Docker Hub aliases are stored
const DOCKER_HUB: &str = "docker.io";

const DOCKER_HUB_ALIASES: &[&str] = &["docker.io", "index.docker.io", "registry-1.docker.io"];

/// Stored login for one registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AuthFile {
    #[serde(default)]
    auths: BTreeMap<String, Credential>,
}

/// Credential store backed by a single JSON file
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Credentials stored for a registry host
    pub async fn lookup(&self, host: &str) -> CracResult<Option<Credential>> {
        let file = self.load().await?;
        let found = file.auths.get(&normalize_host(host)).cloned();
        debug!(host = %host, found = found.is_some(), "Credential lookup");
        Ok(found)
    }

    /// Store credentials for a registry host, replacing any existing entry
    pub async fn store(&self, host: &str, username: &str, password: &str) -> CracResult<()> {
        let mut file = self.load().await?;
        file.auths.insert(
            normalize_host(host),
            Credential {
                username: username.to_string(),
                password: password.to_string(),
            },
        );
        self.save(&file).await
    }

    /// Remove credentials for a host. Returns whether an entry existed.
    pub async fn remove(&self, host: &str) -> CracResult<bool> {
        let mut file = self.load().await?;
        let removed = file.auths.remove(&normalize_host(host)).is_some();
        if removed {
            self.save(&file).await?;
        }
        Ok(removed)
    }

    /// Hosts with stored credentials, sorted
    pub async fn hosts(&self) -> CracResult<Vec<String>> {
        Ok(self.load().await?.auths.into_keys().collect())
    }

    async fn load(&self) -> CracResult<AuthFile> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AuthFile::default()),
            Err(e) => {
                return Err(CracError::io(
                    format!("reading credential store {}", self.path.display()),
                    e,
                ))
            }
        };

        serde_json::from_str(&content).map_err(|e| CracError::ConfigInvalid {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    async fn save(&self, file: &AuthFile) -> CracResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CracError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let tmp_path = self.path.with_extension("tmp");
        let content = serde_json::to_string_pretty(file)?;
        fs::write(&tmp_path, content).await.map_err(|e| {
            CracError::io(format!("writing credential store {}", tmp_path.display()), e)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            fs::set_permissions(&tmp_path, perms)
                .await
                .map_err(|e| CracError::io("setting credential store permissions", e))?;
        }

        fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            CracError::io(format!("replacing credential store {}", self.path.display()), e)
        })?;

        debug!(path = %self.path.display(), hosts = file.auths.len(), "Saved credential store");
        Ok(())
    }
}

/// Lowercase a host and fold the Docker Hub aliases together
pub fn normalize_host(host: &str) -> String {
    let host = host
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_lowercase();

    if DOCKER_HUB_ALIASES.contains(&host.as_str()) {
        DOCKER_HUB.to_string()
    } else {
        host
    }
}

//! Configuration schema for crac
//!
//! Configuration is stored at `~/.config/crac/config.toml`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Registry access
    pub registry: RegistryConfig,

    /// Cache codec defaults
    pub cache: CacheConfig,

    /// Named input sets, selected with `--profile`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Registry settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Repository used when a command is given none
    pub default_repository: Option<String>,

    /// Accept invalid TLS certificates
    pub insecure: bool,

    /// Talk plain HTTP
    pub force_http: bool,

    /// Credential store location (default: `~/.config/crac/auth.json`)
    pub auth_file: Option<PathBuf>,
}

/// Cache codec settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum bytes per layer, e.g. "512MiB" ("0" = single layer)
    pub chunk_size: String,

    /// Octal mode applied to extracted files
    pub file_perm: String,

    /// Platform override as `os/arch`
    pub platform: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            chunk_size: "0".to_string(),
            file_perm: "0755".to_string(),
            platform: None,
        }
    }
}

/// Named bundle of cache inputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Extra cache keys
    pub keys: Vec<String>,

    /// Dependency file patterns hashed into the key
    pub deps: Vec<String>,

    /// Payload file patterns stored in the image
    pub files: Vec<String>,
}

//! Error types for crac
//!
//! All modules use `CracResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for crac operations
pub type CracResult<T> = Result<T, CracError>;

/// All errors that can occur in crac
#[derive(Error, Debug)]
pub enum CracError {
    // Input errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to push an empty cache image: no payload files matched")]
    EmptyWorkingSet,

    #[error("Invalid logical name '{name}': {reason}")]
    InvalidLogicalName { name: String, reason: String },

    #[error("Invalid file pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // Image errors
    #[error("Malformed cache image: {0}")]
    MalformedImage(String),

    #[error("Incompatible cache schema version '{found}', accepted {accepted}")]
    IncompatibleVersion { found: String, accepted: String },

    #[error("Digest mismatch for {what}: expected {expected}, got {actual}")]
    DigestMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("Archive entry '{0}' would be extracted outside the destination directory")]
    PathEscape(String),

    // Registry errors
    #[error("Registry error ({registry}): {message}")]
    Transport { registry: String, message: String },

    #[error("Invalid tag '{0}': must match [A-Za-z0-9_][A-Za-z0-9._-]{{0,127}}")]
    InvalidTag(String),

    #[error("Invalid repository reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    User(String),
}

impl CracError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a transport error for a registry
    pub fn transport(registry: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            registry: registry.into(),
            message: message.into(),
        }
    }

    /// Create a malformed image error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedImage(reason.into())
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::EmptyWorkingSet => Some("Pass at least one --file pattern that matches a file"),
            Self::IncompatibleVersion { .. } => {
                Some("Re-push the cache with this version of crac, or pull with a matching version")
            }
            Self::Transport { .. } => {
                Some("Check the repository name and credentials. Run: crac login <registry>")
            }
            Self::PathEscape(_) => Some("The cache image was not produced by crac; do not trust it"),
            Self::ProfileNotFound(_) => Some("Define it under [profiles.<name>] in the config file"),
            _ => None,
        }
    }
}

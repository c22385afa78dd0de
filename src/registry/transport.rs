//! Registry transport abstraction
//!
//! Implemented by the remote registry client and the on-disk OCI layout, so
//! the push/pull pipelines never care where images are stored.

use crate::cache::CacheImage;
use crate::error::CracResult;
use crate::registry::reference::Target;
use async_trait::async_trait;
use std::fmt;

/// Credentials presented to a registry
#[derive(Clone, Default, PartialEq, Eq)]
pub enum RegistryAuth {
    #[default]
    Anonymous,
    Basic { username: String, password: String },
}

impl RegistryAuth {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

// Keep passwords out of logs
impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::Basic { username, .. } => write!(f, "Basic({}, ***)", username),
        }
    }
}

/// How to talk to a remote registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// HTTPS with certificate verification
    #[default]
    Https,
    /// HTTPS, accepting invalid certificates
    Insecure,
    /// Plain HTTP
    Http,
}

impl TlsMode {
    /// Resolve from the `--force-http` and `--insecure` switches; HTTP wins
    pub fn from_flags(insecure: bool, force_http: bool) -> Self {
        match (insecure, force_http) {
            (_, true) => Self::Http,
            (true, false) => Self::Insecure,
            (false, false) => Self::Https,
        }
    }
}

/// Push/pull wire protocol for cache images
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// Upload an image under `target`, returning where the manifest landed
    async fn push(
        &self,
        image: &CacheImage,
        target: &Target,
        auth: &RegistryAuth,
    ) -> CracResult<String>;

    /// Download the image stored under `target`
    async fn pull(&self, target: &Target, auth: &RegistryAuth) -> CracResult<CacheImage>;

    /// Whether an image is already stored under `target`
    async fn exists(&self, target: &Target, auth: &RegistryAuth) -> CracResult<bool>;

    /// Human-readable transport name for display
    fn transport_name(&self) -> &'static str;
}

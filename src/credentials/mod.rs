//! Registry credentials
//!
//! Resolution order: explicit username/password, then the credential store
//! entry for the registry host, then anonymous.

mod store;

pub use store::{normalize_host, Credential, CredentialStore};

use crate::error::CracResult;
use crate::registry::{RegistryAuth, Repository};
use tracing::debug;

/// Username/password given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ExplicitCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Work out which credentials to present for `repository`
pub async fn resolve_auth(
    repository: &Repository,
    explicit: &ExplicitCredentials,
    store: &CredentialStore,
) -> CracResult<RegistryAuth> {
    let Some(host) = repository.registry() else {
        return Ok(RegistryAuth::Anonymous);
    };

    if let (Some(username), Some(password)) = (&explicit.username, &explicit.password) {
        debug!(host = %host, "Using explicit credentials");
        return Ok(RegistryAuth::basic(username, password));
    }

    match store.lookup(host).await? {
        Some(cred) => {
            debug!(host = %host, store = %store.path().display(), "Using stored credentials");
            Ok(RegistryAuth::basic(cred.username, cred.password))
        }
        None => {
            debug!(host = %host, "No credentials found, using anonymous access");
            Ok(RegistryAuth::Anonymous)
        }
    }
}

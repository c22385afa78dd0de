//! Repository references
//!
//! Parses where a cache image lives:
//! - `ghcr.io/org/cache` → remote registry `ghcr.io`, path `org/cache`
//! - `localhost:5000/cache` → remote registry `localhost:5000`
//! - `org/cache` → remote registry `docker.io`
//! - `oci:./layout` → OCI image layout directory on disk

use crate::cache::CacheTag;
use crate::error::{CracError, CracResult};
use std::fmt;
use std::path::PathBuf;

/// Registry used when a reference names none
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Scheme selecting the on-disk layout transport
const LAYOUT_SCHEME: &str = "oci:";

/// Where cache images are stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repository {
    /// Remote registry repository
    Remote { registry: String, path: String },
    /// OCI image layout directory
    Layout(PathBuf),
}

impl Repository {
    pub fn parse(reference: &str) -> CracResult<Self> {
        let reference = reference.trim();
        let invalid = |reason: &str| CracError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        if reference.is_empty() {
            return Err(invalid("empty reference"));
        }

        if let Some(dir) = reference.strip_prefix(LAYOUT_SCHEME) {
            if dir.is_empty() {
                return Err(invalid("missing layout directory after 'oci:'"));
            }
            return Ok(Self::Layout(PathBuf::from(dir)));
        }

        if reference.contains('@') {
            return Err(invalid("digests are not supported; the tag is derived"));
        }

        let (registry, path) = split_registry(reference);

        if path.rsplit('/').next().is_some_and(|last| last.contains(':')) {
            return Err(invalid("tag is derived from inputs; pass --tag to override"));
        }

        for component in path.split('/') {
            if component.is_empty() {
                return Err(invalid("empty path component"));
            }
            let valid = component
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
            if !valid {
                return Err(invalid("path must be lowercase alphanumerics and . _ -"));
            }
        }

        Ok(Self::Remote {
            registry: registry.to_string(),
            path: path.to_string(),
        })
    }

    /// Registry host, or `None` for on-disk layouts
    pub fn registry(&self) -> Option<&str> {
        match self {
            Self::Remote { registry, .. } => Some(registry),
            Self::Layout(_) => None,
        }
    }

    pub fn is_layout(&self) -> bool {
        matches!(self, Self::Layout(_))
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote { registry, path } => write!(f, "{}/{}", registry, path),
            Self::Layout(dir) => write!(f, "{}{}", LAYOUT_SCHEME, dir.display()),
        }
    }
}

/// The first component is a registry host if it looks like one
fn split_registry(reference: &str) -> (&str, &str) {
    match reference.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first, rest)
        }
        _ => (DEFAULT_REGISTRY, reference),
    }
}

/// A repository plus the tag of one cache image in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub repository: Repository,
    pub tag: CacheTag,
}

impl Target {
    pub fn new(repository: Repository, tag: CacheTag) -> Self {
        Self { repository, tag }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

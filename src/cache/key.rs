//! Cache key derivation
//!
//! Turns a file set and a key set into a short deterministic tag. Same
//! inputs = same tag, regardless of the order they were supplied in.

use crate::cache::fileset::{resolve_source, FileSet, KeySet};
use crate::error::{CracError, CracResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Tag used when there is nothing to hash
pub const DEFAULT_TAG: &str = "latest";

/// Number of hex characters kept from the final digest
const TAG_LEN: usize = 8;

/// Delimiter placed between per-input digests before the final hash
const DIGEST_DELIMITER: &str = "\n";

/// A registry tag identifying a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheTag(String);

impl CacheTag {
    /// Validate a caller-supplied tag against the OCI tag grammar
    pub fn parse(tag: &str) -> CracResult<Self> {
        let mut chars = tag.chars();
        let valid_first = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

        if !valid_first || !valid_rest || tag.len() > 128 {
            return Err(CracError::InvalidTag(tag.to_string()));
        }
        Ok(Self(tag.to_string()))
    }

    /// The sentinel tag used when no inputs were supplied
    pub fn sentinel() -> Self {
        Self(DEFAULT_TAG.to_string())
    }

    /// Whether this is the sentinel tag
    pub fn is_sentinel(&self) -> bool {
        self.0 == DEFAULT_TAG
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hex-encoded SHA256 of a byte slice
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash a file's logical name followed by its contents
fn hash_file_entry(logical_name: &str, path: &Path) -> CracResult<String> {
    let contents = fs::read(path)
        .map_err(|e| CracError::io(format!("reading dependency file {}", path.display()), e))?;

    let mut hasher = Sha256::new();
    hasher.update(logical_name.as_bytes());
    hasher.update(&contents);
    Ok(hex::encode(hasher.finalize()))
}

/// Derive the cache tag for a file set and key set.
///
/// Every file contributes `sha256(logical_name ++ contents)`, every key
/// contributes `sha256(key)`. The hex digests are sorted, joined with a
/// newline and hashed once more; the first 8 hex chars are the tag.
pub fn derive(files: &FileSet, keys: &KeySet, workdir: &Path) -> CracResult<CacheTag> {
    if files.is_empty() && keys.is_empty() {
        debug!("No cache key inputs, using default tag");
        return Ok(CacheTag::sentinel());
    }

    let mut digests = Vec::with_capacity(files.len() + keys.len());

    for (name, source) in files.iter() {
        let path = resolve_source(workdir, source);
        let digest = hash_file_entry(name, &path)?;
        debug!(file = %name, digest = %digest, "Hashed key file");
        digests.push(digest);
    }

    for key in keys.iter() {
        digests.push(sha256_hex(key.as_bytes()));
    }

    digests.sort();

    let combined = sha256_hex(digests.join(DIGEST_DELIMITER).as_bytes());
    let tag = CacheTag(combined[..TAG_LEN].to_string());

    debug!(tag = %tag, inputs = digests.len(), "Derived cache tag");
    Ok(tag)
}

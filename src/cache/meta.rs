//! Cache metadata record and version gate

use crate::cache::archive::{build_from_entries, ArchiveSegment};
use crate::error::{CracError, CracResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Schema version written by this build
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Logical path of the record inside the metadata segment
pub const META_PATH: &str = "crac/meta.json";

/// Identity of one payload segment, recorded in layer order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentManifest {
    pub index: usize,
    pub digest: String,
    #[serde(default)]
    pub entries: Vec<String>,
}

impl From<&ArchiveSegment> for SegmentManifest {
    fn from(segment: &ArchiveSegment) -> Self {
        Self {
            index: segment.index(),
            digest: segment.digest().to_string(),
            entries: segment.entries().to_vec(),
        }
    }
}

/// Versioned record stored alongside the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRecord {
    #[serde(default)]
    pub version: String,
    /// Absent in records from older producers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentManifest>>,
}

impl Default for MetaRecord {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            segments: None,
        }
    }
}

impl MetaRecord {
    /// Record for the current schema describing the given payload segments
    pub fn for_segments(segments: &[ArchiveSegment]) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            segments: Some(segments.iter().map(SegmentManifest::from).collect()),
        }
    }

    /// Serialize the record into its single-entry metadata segment
    pub fn to_segment(&self, index: usize) -> CracResult<ArchiveSegment> {
        let json = serde_json::to_vec(self)?;
        build_from_entries(index, &[(META_PATH, json.as_slice())])
    }

    /// Read the record back out of a metadata segment
    pub fn from_segment(segment: &ArchiveSegment) -> CracResult<Self> {
        let json = segment
            .read_entry(META_PATH)?
            .ok_or_else(|| CracError::malformed(format!("metadata layer has no {}", META_PATH)))?;

        serde_json::from_slice(&json)
            .map_err(|e| CracError::malformed(format!("unreadable {}: {}", META_PATH, e)))
    }
}

/// Range of accepted schema major versions, `min_major <= major < max_major`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub min_major: u64,
    pub max_major: u64,
}

impl Default for VersionRange {
    fn default() -> Self {
        Self {
            min_major: 1,
            max_major: 2,
        }
    }
}

impl VersionRange {
    pub fn contains(&self, version: &semver::Version) -> bool {
        self.min_major <= version.major && version.major < self.max_major
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ">={}.0.0, <{}.0.0", self.min_major, self.max_major)
    }
}

/// Reject records whose schema version falls outside `accepted`
pub fn check(record: &MetaRecord, accepted: &VersionRange) -> CracResult<()> {
    let incompatible = || CracError::IncompatibleVersion {
        found: if record.version.is_empty() {
            "<missing>".to_string()
        } else {
            record.version.clone()
        },
        accepted: accepted.to_string(),
    };

    let version = semver::Version::parse(record.version.trim()).map_err(|_| incompatible())?;
    if !accepted.contains(&version) {
        return Err(incompatible());
    }

    debug!(version = %version, accepted = %accepted, "Cache schema version accepted");
    Ok(())
}

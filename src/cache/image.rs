//! Cache image assembly
//!
//! A cache image is an ordinary OCI image whose layers are gzip-compressed
//! archive segments. Each layer carries a role (payload or metadata) which is
//! written to the image config's history as a `created_by` marker.

use crate::cache::archive::{content_digest, ArchiveSegment};
use crate::cache::meta::MetaRecord;
use crate::error::{CracError, CracResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use tracing::debug;

/// Media type of every cache layer
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Media type of the image config
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";

/// History marker for payload layers
pub const PAYLOAD_MARKER: &str = "CRACCOPY";

/// History marker for the metadata layer
pub const METADATA_MARKER: &str = "CRACMETA";

/// What a layer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerRole {
    Payload,
    Metadata,
}

impl LayerRole {
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Payload => PAYLOAD_MARKER,
            Self::Metadata => METADATA_MARKER,
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker.trim() {
            PAYLOAD_MARKER => Some(Self::Payload),
            METADATA_MARKER => Some(Self::Metadata),
            _ => None,
        }
    }
}

/// Target platform recorded in the image config and used as a cache key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    /// Platform of the running host, in OCI naming
    pub fn host() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            other => other,
        };
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    /// Platform used when the cache must not be tied to a host
    pub fn unknown() -> Self {
        Self {
            os: "unknown".to_string(),
            arch: "unknown".to_string(),
        }
    }

    /// Parse `os/arch`
    pub fn parse(value: &str) -> CracResult<Self> {
        match value.trim().split_once('/') {
            Some((os, arch)) if !os.is_empty() && !arch.is_empty() && !arch.contains('/') => {
                Ok(Self {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
            _ => Err(CracError::User(format!(
                "Invalid platform '{}': expected <os>/<arch>",
                value
            ))),
        }
    }

    /// Key contributed to the cache key set
    pub fn key(&self) -> String {
        format!("platform:{}", self)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// One compressed layer blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    data: Vec<u8>,
    digest: String,
    diff_id: String,
}

impl Layer {
    /// Compress a segment into a layer
    pub fn compress(segment: &ArchiveSegment) -> CracResult<Self> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(segment.data())
            .map_err(|e| CracError::io(format!("compressing segment {}", segment.index()), e))?;
        let data = encoder
            .finish()
            .map_err(|e| CracError::io(format!("compressing segment {}", segment.index()), e))?;

        Ok(Self {
            digest: content_digest(&data),
            diff_id: segment.digest().to_string(),
            data,
        })
    }

    /// Wrap a compressed blob whose uncompressed digest is `diff_id`
    pub fn from_blob(data: Vec<u8>, diff_id: impl Into<String>) -> Self {
        Self {
            digest: content_digest(&data),
            diff_id: diff_id.into(),
            data,
        }
    }

    /// Compressed bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Digest of the compressed bytes
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Digest of the uncompressed tar stream
    pub fn diff_id(&self) -> &str {
        &self.diff_id
    }

    /// Decompress back into a segment, checking the result against the diff id
    pub fn decompress(&self, index: usize) -> CracResult<ArchiveSegment> {
        let mut tar = Vec::new();
        GzDecoder::new(self.data.as_slice())
            .read_to_end(&mut tar)
            .map_err(|e| CracError::io(format!("decompressing layer {}", self.digest), e))?;

        let segment = ArchiveSegment::from_tar(index, tar)?;
        if segment.digest() != self.diff_id {
            return Err(CracError::DigestMismatch {
                what: format!("layer {}", self.digest),
                expected: self.diff_id.clone(),
                actual: segment.digest().to_string(),
            });
        }
        Ok(segment)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ImageConfig {
    architecture: String,
    os: String,
    #[serde(default)]
    config: RuntimeConfig,
    rootfs: RootFs,
    #[serde(default)]
    history: Vec<History>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RuntimeConfig {}

#[derive(Debug, Serialize, Deserialize)]
struct RootFs {
    #[serde(rename = "type")]
    kind: String,
    diff_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct History {
    #[serde(default)]
    created_by: String,
}

/// Ordered layers plus one role per layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheImage {
    layers: Vec<Layer>,
    roles: Vec<LayerRole>,
    platform: Platform,
}

impl CacheImage {
    /// Build an image from parts without checking role invariants
    pub fn new(layers: Vec<Layer>, roles: Vec<LayerRole>, platform: Platform) -> Self {
        Self {
            layers,
            roles,
            platform,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn roles(&self) -> &[LayerRole] {
        &self.roles
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Serialized image config. Carries no timestamps so equal images serialize equally.
    pub fn config_json(&self) -> CracResult<Vec<u8>> {
        let config = ImageConfig {
            architecture: self.platform.arch.clone(),
            os: self.platform.os.clone(),
            config: RuntimeConfig::default(),
            rootfs: RootFs {
                kind: "layers".to_string(),
                diff_ids: self.layers.iter().map(|l| l.diff_id.clone()).collect(),
            },
            history: self
                .roles
                .iter()
                .map(|role| History {
                    created_by: role.marker().to_string(),
                })
                .collect(),
        };
        Ok(serde_json::to_vec(&config)?)
    }

    /// Rebuild an image from a config blob and its layer blobs, in manifest order
    pub fn from_parts(config_json: &[u8], blobs: Vec<Vec<u8>>) -> CracResult<Self> {
        let config: ImageConfig = serde_json::from_slice(config_json)
            .map_err(|e| CracError::malformed(format!("unreadable image config: {}", e)))?;

        if config.rootfs.diff_ids.len() != blobs.len() {
            return Err(CracError::malformed(format!(
                "config lists {} diff ids for {} layers",
                config.rootfs.diff_ids.len(),
                blobs.len()
            )));
        }

        let roles = config
            .history
            .iter()
            .map(|h| {
                LayerRole::from_marker(&h.created_by).ok_or_else(|| {
                    CracError::malformed(format!("unknown layer marker '{}'", h.created_by))
                })
            })
            .collect::<CracResult<Vec<_>>>()?;

        let layers = blobs
            .into_iter()
            .zip(config.rootfs.diff_ids)
            .map(|(data, diff_id)| Layer::from_blob(data, diff_id))
            .collect();

        Ok(Self {
            layers,
            roles,
            platform: Platform {
                os: config.os,
                arch: config.architecture,
            },
        })
    }
}

/// Assemble payload segments and a metadata record into a cache image.
///
/// The record's segment manifest is filled from `segments`, then payload
/// layers are emitted in segment order followed by the metadata layer.
pub fn assemble(
    segments: &[ArchiveSegment],
    mut record: MetaRecord,
    platform: &Platform,
) -> CracResult<CacheImage> {
    if segments.is_empty() {
        return Err(CracError::EmptyWorkingSet);
    }

    record.segments = MetaRecord::for_segments(segments).segments;
    let meta_segment = record.to_segment(segments.len())?;

    let mut layers = Vec::with_capacity(segments.len() + 1);
    let mut roles = Vec::with_capacity(segments.len() + 1);

    for segment in segments {
        let layer = Layer::compress(segment)?;
        debug!(
            segment = segment.index(),
            digest = %layer.digest(),
            diff_id = %layer.diff_id(),
            bytes = layer.data().len(),
            "Compressed payload layer"
        );
        layers.push(layer);
        roles.push(LayerRole::Payload);
    }

    layers.push(Layer::compress(&meta_segment)?);
    roles.push(LayerRole::Metadata);

    Ok(CacheImage::new(layers, roles, platform.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::archive::build_from_entries;
    use crate::cache::meta::SCHEMA_VERSION;

    fn linux() -> Platform {
        Platform::parse("linux/amd64").unwrap()
    }

    #[test]
    fn single_segment_gives_payload_then_metadata() {
        let segment = build_from_entries(0, &[("a.txt", b"hello")]).unwrap();
        let image = assemble(&[segment], MetaRecord::default(), &linux()).unwrap();

        assert_eq!(image.layers().len(), 2);
        assert_eq!(image.roles(), &[LayerRole::Payload, LayerRole::Metadata]);
    }

    #[test]
    fn metadata_layer_describes_payload() {
        let first = build_from_entries(0, &[("a", b"1")]).unwrap();
        let second = build_from_entries(1, &[("b", b"2")]).unwrap();
        let image = assemble(&[first.clone(), second.clone()], MetaRecord::default(), &linux())
            .unwrap();

        let meta = image.layers()[2].decompress(2).unwrap();
        let record = MetaRecord::from_segment(&meta).unwrap();
        let manifest = record.segments.unwrap();

        assert_eq!(record.version, SCHEMA_VERSION);
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest[0].digest, first.digest());
        assert_eq!(manifest[1].digest, second.digest());
    }

    #[test]
    fn empty_segments_rejected() {
        let result = assemble(&[], MetaRecord::default(), &linux());
        assert!(matches!(result, Err(CracError::EmptyWorkingSet)));
    }

    #[test]
    fn layer_round_trips_and_checks_diff_id() {
        let segment = build_from_entries(0, &[("x", b"payload")]).unwrap();
        let layer = Layer::compress(&segment).unwrap();

        assert_eq!(layer.diff_id(), segment.digest());
        assert_eq!(layer.decompress(0).unwrap(), segment);

        let forged = Layer::from_blob(layer.data().to_vec(), "sha256:0000");
        assert!(matches!(
            forged.decompress(0),
            Err(CracError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn compression_is_deterministic() {
        let segment = build_from_entries(0, &[("x", b"same")]).unwrap();
        assert_eq!(
            Layer::compress(&segment).unwrap(),
            Layer::compress(&segment).unwrap()
        );
    }

    #[test]
    fn config_round_trips_roles_and_platform() {
        let segment = build_from_entries(0, &[("a", b"1")]).unwrap();
        let image = assemble(&[segment], MetaRecord::default(), &linux()).unwrap();

        let config = image.config_json().unwrap();
        let text = String::from_utf8(config.clone()).unwrap();
        assert!(text.contains(PAYLOAD_MARKER));
        assert!(text.contains(METADATA_MARKER));
        assert!(!text.contains("created\""));

        let blobs = image.layers().iter().map(|l| l.data().to_vec()).collect();
        let rebuilt = CacheImage::from_parts(&config, blobs).unwrap();
        assert_eq!(rebuilt, image);
    }

    #[test]
    fn from_parts_rejects_unknown_marker() {
        let config = br#"{"architecture":"amd64","os":"linux","rootfs":{"type":"layers","diff_ids":["sha256:aa"]},"history":[{"created_by":"RUN make"}]}"#;
        let result = CacheImage::from_parts(config, vec![vec![0u8]]);
        assert!(matches!(result, Err(CracError::MalformedImage(_))));
    }

    #[test]
    fn from_parts_rejects_diff_id_count_mismatch() {
        let config = br#"{"architecture":"amd64","os":"linux","rootfs":{"type":"layers","diff_ids":[]},"history":[]}"#;
        let result = CacheImage::from_parts(config, vec![vec![0u8]]);
        assert!(matches!(result, Err(CracError::MalformedImage(_))));
    }

    #[test]
    fn platform_parsing_and_key() {
        let platform = Platform::parse("linux/arm64").unwrap();
        assert_eq!(platform.key(), "platform:linux/arm64");
        assert!(Platform::parse("linux").is_err());
        assert!(Platform::parse("/arm64").is_err());
        assert!(Platform::parse("a/b/c").is_err());
        assert_eq!(Platform::unknown().to_string(), "unknown/unknown");
    }

    #[test]
    fn host_platform_uses_oci_names() {
        let host = Platform::host();
        assert_ne!(host.arch, "x86_64");
        assert_ne!(host.os, "macos");
    }
}

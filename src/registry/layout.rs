//! OCI image layout transport
//!
//! Stores cache images in a directory following the OCI image layout:
//! `oci-layout`, `index.json` and content-addressed `blobs/sha256/<hex>`.
//! Tags are recorded as `org.opencontainers.image.ref.name` annotations.

use crate::cache::archive::{content_digest, DIGEST_PREFIX};
use crate::cache::image::{CONFIG_MEDIA_TYPE, LAYER_MEDIA_TYPE};
use crate::cache::CacheImage;
use crate::error::{CracError, CracResult};
use crate::registry::reference::{Repository, Target};
use crate::registry::transport::{RegistryAuth, RegistryTransport};
use async_trait::async_trait;
use oci_distribution::manifest::{OciDescriptor, OciImageManifest, OCI_IMAGE_MEDIA_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Annotation carrying the tag of an index entry
pub const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

const LAYOUT_FILE: &str = "oci-layout";
const LAYOUT_CONTENT: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;
const INDEX_FILE: &str = "index.json";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutIndex {
    schema_version: u8,
    #[serde(default)]
    manifests: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    media_type: String,
    digest: String,
    size: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    annotations: BTreeMap<String, String>,
}

impl IndexEntry {
    fn tag(&self) -> Option<&str> {
        self.annotations.get(REF_NAME_ANNOTATION).map(String::as_str)
    }
}

/// Stores images in OCI layout directories
#[derive(Debug, Default)]
pub struct OciLayout;

impl OciLayout {
    pub fn new() -> Self {
        Self
    }
}

fn layout_dir(target: &Target) -> CracResult<&Path> {
    match &target.repository {
        Repository::Layout(dir) => Ok(dir.as_path()),
        Repository::Remote { .. } => Err(CracError::InvalidReference {
            reference: target.to_string(),
            reason: "not an OCI layout repository".to_string(),
        }),
    }
}

/// Path of a blob, refusing digests that are not plain `sha256:<hex>`
fn blob_path(dir: &Path, digest: &str) -> CracResult<PathBuf> {
    let hex = digest
        .strip_prefix(DIGEST_PREFIX)
        .filter(|h| !h.is_empty() && h.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| CracError::malformed(format!("unsupported digest '{}'", digest)))?;
    Ok(dir.join("blobs").join("sha256").join(hex))
}

async fn write_blob(dir: &Path, data: &[u8]) -> CracResult<OciDescriptorParts> {
    let digest = content_digest(data);
    let path = blob_path(dir, &digest)?;

    if fs::try_exists(&path).await.unwrap_or(false) {
        debug!(digest = %digest, "Blob already present");
    } else {
        fs::write(&path, data)
            .await
            .map_err(|e| CracError::io(format!("writing blob {}", path.display()), e))?;
    }

    Ok(OciDescriptorParts {
        digest,
        size: data.len() as i64,
    })
}

async fn read_blob(dir: &Path, digest: &str) -> CracResult<Vec<u8>> {
    let path = blob_path(dir, digest)?;
    let data = fs::read(&path)
        .await
        .map_err(|e| CracError::io(format!("reading blob {}", path.display()), e))?;

    let actual = content_digest(&data);
    if actual != digest {
        return Err(CracError::DigestMismatch {
            what: format!("blob {}", path.display()),
            expected: digest.to_string(),
            actual,
        });
    }
    Ok(data)
}

struct OciDescriptorParts {
    digest: String,
    size: i64,
}

impl OciDescriptorParts {
    fn into_descriptor(self, media_type: &str) -> OciDescriptor {
        OciDescriptor {
            media_type: media_type.to_string(),
            digest: self.digest,
            size: self.size,
            ..Default::default()
        }
    }
}

async fn read_index(dir: &Path) -> CracResult<LayoutIndex> {
    let path = dir.join(INDEX_FILE);
    match fs::read(&path).await {
        Ok(data) => serde_json::from_slice(&data)
            .map_err(|e| CracError::malformed(format!("unreadable {}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LayoutIndex {
            schema_version: 2,
            manifests: Vec::new(),
        }),
        Err(e) => Err(CracError::io(format!("reading {}", path.display()), e)),
    }
}

async fn write_index(dir: &Path, index: &LayoutIndex) -> CracResult<()> {
    let path = dir.join(INDEX_FILE);
    let tmp = dir.join(format!("{}.tmp", INDEX_FILE));
    let data = serde_json::to_vec_pretty(index)?;

    fs::write(&tmp, data)
        .await
        .map_err(|e| CracError::io(format!("writing {}", tmp.display()), e))?;
    fs::rename(&tmp, &path)
        .await
        .map_err(|e| CracError::io(format!("replacing {}", path.display()), e))
}

#[async_trait]
impl RegistryTransport for OciLayout {
    async fn push(
        &self,
        image: &CacheImage,
        target: &Target,
        _auth: &RegistryAuth,
    ) -> CracResult<String> {
        let dir = layout_dir(target)?;
        let blobs = dir.join("blobs").join("sha256");
        fs::create_dir_all(&blobs)
            .await
            .map_err(|e| CracError::io(format!("creating {}", blobs.display()), e))?;
        fs::write(dir.join(LAYOUT_FILE), LAYOUT_CONTENT)
            .await
            .map_err(|e| CracError::io(format!("writing {}", LAYOUT_FILE), e))?;

        let mut layers = Vec::with_capacity(image.layers().len());
        for layer in image.layers() {
            layers.push(write_blob(dir, layer.data()).await?.into_descriptor(LAYER_MEDIA_TYPE));
        }
        let config = write_blob(dir, &image.config_json()?)
            .await?
            .into_descriptor(CONFIG_MEDIA_TYPE);

        let manifest = OciImageManifest {
            schema_version: 2,
            media_type: Some(OCI_IMAGE_MEDIA_TYPE.to_string()),
            config,
            layers,
            ..Default::default()
        };
        let manifest_data = serde_json::to_vec(&manifest)?;
        let stored = write_blob(dir, &manifest_data).await?;
        let manifest_digest = stored.digest.clone();

        let mut index = read_index(dir).await?;
        index
            .manifests
            .retain(|entry| entry.tag() != Some(target.tag.as_str()));
        index.manifests.push(IndexEntry {
            media_type: OCI_IMAGE_MEDIA_TYPE.to_string(),
            digest: stored.digest,
            size: stored.size,
            annotations: BTreeMap::from([(
                REF_NAME_ANNOTATION.to_string(),
                target.tag.to_string(),
            )]),
        });
        write_index(dir, &index).await?;

        info!(image = %target, digest = %manifest_digest, "Stored cache image in layout");
        Ok(manifest_digest)
    }

    async fn pull(&self, target: &Target, _auth: &RegistryAuth) -> CracResult<CacheImage> {
        let dir = layout_dir(target)?;
        let index = read_index(dir).await?;

        let entry = index
            .manifests
            .iter()
            .find(|entry| entry.tag() == Some(target.tag.as_str()))
            .ok_or_else(|| {
                CracError::transport(
                    dir.display().to_string(),
                    format!("tag '{}' not found", target.tag),
                )
            })?;

        let manifest: OciImageManifest = serde_json::from_slice(&read_blob(dir, &entry.digest).await?)
            .map_err(|e| CracError::malformed(format!("unreadable manifest: {}", e)))?;

        debug!(digest = %entry.digest, layers = manifest.layers.len(), "Read manifest from layout");

        let config = read_blob(dir, &manifest.config.digest).await?;
        let mut blobs = Vec::with_capacity(manifest.layers.len());
        for descriptor in &manifest.layers {
            blobs.push(read_blob(dir, &descriptor.digest).await?);
        }

        CacheImage::from_parts(&config, blobs)
    }

    async fn exists(&self, target: &Target, _auth: &RegistryAuth) -> CracResult<bool> {
        let dir = layout_dir(target)?;
        let index = read_index(dir).await?;
        Ok(index
            .manifests
            .iter()
            .any(|entry| entry.tag() == Some(target.tag.as_str())))
    }

    fn transport_name(&self) -> &'static str {
        "oci-layout"
    }
}

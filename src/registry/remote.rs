//! Remote registry transport backed by `oci-distribution`

use crate::cache::archive::content_digest;
use crate::cache::image::{CONFIG_MEDIA_TYPE, LAYER_MEDIA_TYPE};
use crate::cache::CacheImage;
use crate::error::{CracError, CracResult};
use crate::registry::reference::{Repository, Target};
use crate::registry::transport::{RegistryAuth, RegistryTransport, TlsMode};
use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol, Config, ImageLayer};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference};
use tracing::{debug, info};

/// Talks to an OCI distribution registry over HTTP(S)
pub struct OciRegistry {
    client: Client,
    tls: TlsMode,
}

impl OciRegistry {
    pub fn new(tls: TlsMode) -> Self {
        let config = ClientConfig {
            protocol: match tls {
                TlsMode::Http => ClientProtocol::Http,
                TlsMode::Https | TlsMode::Insecure => ClientProtocol::Https,
            },
            accept_invalid_certificates: tls == TlsMode::Insecure,
            ..Default::default()
        };

        Self {
            client: Client::new(config),
            tls,
        }
    }

    pub fn tls(&self) -> TlsMode {
        self.tls
    }

    async fn pull_blob(
        &self,
        reference: &Reference,
        descriptor: &OciDescriptor,
        registry: &str,
    ) -> CracResult<Vec<u8>> {
        let mut data: Vec<u8> = Vec::new();
        self.client
            .pull_blob(reference, descriptor, &mut data)
            .await
            .map_err(|e| {
                CracError::transport(
                    registry,
                    format!("Failed to pull blob {}: {}", descriptor.digest, e),
                )
            })?;

        let actual = content_digest(&data);
        if actual != descriptor.digest {
            return Err(CracError::DigestMismatch {
                what: format!("blob from {}", registry),
                expected: descriptor.digest.clone(),
                actual,
            });
        }
        Ok(data)
    }
}

/// Split a target into its registry host and an oci-distribution reference
fn to_oci_reference(target: &Target) -> CracResult<(String, Reference)> {
    let Repository::Remote { registry, path } = &target.repository else {
        return Err(CracError::InvalidReference {
            reference: target.to_string(),
            reason: "not a remote registry repository".to_string(),
        });
    };

    let ref_str = format!("{}/{}:{}", registry, path, target.tag);
    let reference = ref_str
        .parse::<Reference>()
        .map_err(|e| CracError::InvalidReference {
            reference: ref_str.clone(),
            reason: e.to_string(),
        })?;

    Ok((registry.clone(), reference))
}

fn to_oci_auth(auth: &RegistryAuth) -> OciRegistryAuth {
    match auth {
        RegistryAuth::Basic { username, password } => {
            OciRegistryAuth::Basic(username.clone(), password.clone())
        }
        RegistryAuth::Anonymous => OciRegistryAuth::Anonymous,
    }
}

#[async_trait]
impl RegistryTransport for OciRegistry {
    async fn push(
        &self,
        image: &CacheImage,
        target: &Target,
        auth: &RegistryAuth,
    ) -> CracResult<String> {
        let (registry, reference) = to_oci_reference(target)?;

        let layers: Vec<ImageLayer> = image
            .layers()
            .iter()
            .map(|layer| ImageLayer::new(layer.data().to_vec(), LAYER_MEDIA_TYPE.to_string(), None))
            .collect();
        let config_data = image.config_json()?;
        let config_digest = content_digest(&config_data);
        let config = Config::new(config_data, CONFIG_MEDIA_TYPE.to_string(), None);

        info!(image = %target, layers = layers.len(), "Pushing cache image");

        let response = self
            .client
            .push(&reference, &layers, config, &to_oci_auth(auth), None)
            .await
            .map_err(|e| CracError::transport(&registry, format!("Failed to push image: {}", e)))?;

        debug!(
            manifest_url = %response.manifest_url,
            config = %config_digest,
            "Cache image pushed"
        );
        Ok(response.manifest_url)
    }

    async fn pull(&self, target: &Target, auth: &RegistryAuth) -> CracResult<CacheImage> {
        let (registry, reference) = to_oci_reference(target)?;

        info!(image = %target, "Pulling cache image");

        let (manifest, manifest_digest) = self
            .client
            .pull_image_manifest(&reference, &to_oci_auth(auth))
            .await
            .map_err(|e| {
                CracError::transport(&registry, format!("Failed to pull manifest: {}", e))
            })?;

        debug!(digest = %manifest_digest, layers = manifest.layers.len(), "Fetched manifest");

        let config = self.pull_blob(&reference, &manifest.config, &registry).await?;

        let mut blobs = Vec::with_capacity(manifest.layers.len());
        for descriptor in &manifest.layers {
            debug!(digest = %descriptor.digest, size = descriptor.size, "Pulling layer");
            blobs.push(self.pull_blob(&reference, descriptor, &registry).await?);
        }

        CacheImage::from_parts(&config, blobs)
    }

    async fn exists(&self, target: &Target, auth: &RegistryAuth) -> CracResult<bool> {
        let (_, reference) = to_oci_reference(target)?;

        match self
            .client
            .fetch_manifest_digest(&reference, &to_oci_auth(auth))
            .await
        {
            Ok(digest) => {
                debug!(image = %target, digest = %digest, "Cache image already present");
                Ok(true)
            }
            Err(e) => {
                debug!(image = %target, error = %e, "Cache image not found");
                Ok(false)
            }
        }
    }

    fn transport_name(&self) -> &'static str {
        "registry"
    }
}

//! Layer role lookup
//!
//! Roles are read from the markers, never inferred from layer position.

use crate::cache::image::{CacheImage, Layer, LayerRole};
use crate::error::{CracError, CracResult};

/// Layers of a cache image grouped by role
#[derive(Debug)]
pub struct Located<'a> {
    pub metadata: &'a Layer,
    /// Payload layers in image order
    pub payload: Vec<&'a Layer>,
}

/// Find the single metadata layer and all payload layers of an image
pub fn locate(image: &CacheImage) -> CracResult<Located<'_>> {
    let layers = image.layers();
    let roles = image.roles();

    if roles.len() != layers.len() {
        return Err(CracError::malformed(format!(
            "{} role markers for {} layers",
            roles.len(),
            layers.len()
        )));
    }

    let mut metadata = None;
    let mut payload = Vec::new();

    for (layer, role) in layers.iter().zip(roles) {
        match role {
            LayerRole::Metadata if metadata.is_some() => {
                return Err(CracError::malformed("more than one metadata layer"));
            }
            LayerRole::Metadata => metadata = Some(layer),
            LayerRole::Payload => payload.push(layer),
        }
    }

    let metadata = metadata.ok_or_else(|| CracError::malformed("no metadata layer"))?;
    if payload.is_empty() {
        return Err(CracError::malformed("no payload layers"));
    }

    Ok(Located { metadata, payload })
}

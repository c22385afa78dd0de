//! Push and pull pipelines
//!
//! Push: derive tag -> build segments -> assemble image -> transport.
//! Pull: derive tag -> transport -> locate roles -> version gate ->
//! cross-check segments -> extract.

use crate::cache::archive::build;
use crate::cache::extract::extract;
use crate::cache::image::assemble;
use crate::cache::key::CacheTag;
use crate::cache::locate::locate;
use crate::cache::meta::{check, MetaRecord, VersionRange};
use crate::error::{CracError, CracResult};
use crate::options::{PullOptions, PushOptions};
use crate::registry::{RegistryAuth, RegistryTransport, Target};
use tracing::{debug, info};

/// Result of a push
#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub target: Target,
    /// `None` when the push was skipped because the tag already existed
    pub location: Option<String>,
    pub files: usize,
    pub layers: usize,
}

/// Result of a pull
#[derive(Debug, Clone)]
pub struct PullOutcome {
    pub target: Target,
    pub files: usize,
    pub layers: usize,
}

fn resolve_tag(explicit: &Option<CacheTag>, derive: impl FnOnce() -> CracResult<CacheTag>) -> CracResult<CacheTag> {
    match explicit {
        Some(tag) => Ok(tag.clone()),
        None => derive(),
    }
}

/// Build a cache image from the options' file set and push it
pub async fn push(
    opts: &PushOptions,
    transport: &dyn RegistryTransport,
    auth: &RegistryAuth,
) -> CracResult<PushOutcome> {
    if opts.files.is_empty() {
        return Err(CracError::EmptyWorkingSet);
    }

    let tag = resolve_tag(&opts.tag, || opts.key.derive_tag())?;
    let target = Target::new(opts.registry.repository.clone(), tag);

    if opts.skip_existing && transport.exists(&target, auth).await? {
        info!(image = %target, "Cache image exists, skipping push");
        return Ok(PushOutcome {
            target,
            location: None,
            files: opts.files.len(),
            layers: 0,
        });
    }

    let segments = build(&opts.files, &opts.key.workdir, opts.chunk_limit)?;
    let image = assemble(&segments, MetaRecord::default(), &opts.key.platform)?;

    info!(
        image = %target,
        files = opts.files.len(),
        segments = segments.len(),
        transport = transport.transport_name(),
        "Pushing cache"
    );

    let location = transport.push(&image, &target, auth).await?;

    Ok(PushOutcome {
        target,
        location: Some(location),
        files: opts.files.len(),
        layers: image.layers().len(),
    })
}

/// Pull the cache image for the options' inputs and extract it
pub async fn pull(
    opts: &PullOptions,
    transport: &dyn RegistryTransport,
    auth: &RegistryAuth,
) -> CracResult<PullOutcome> {
    let tag = resolve_tag(&opts.tag, || opts.key.derive_tag())?;
    let target = Target::new(opts.registry.repository.clone(), tag);

    let image = transport.pull(&target, auth).await?;
    let located = locate(&image)?;

    let meta_segment = located.metadata.decompress(located.payload.len())?;
    let record = MetaRecord::from_segment(&meta_segment)?;
    check(&record, &VersionRange::default())?;

    if let Some(manifest) = &record.segments {
        if manifest.len() != located.payload.len() {
            return Err(CracError::malformed(format!(
                "metadata lists {} segments, image has {} payload layers",
                manifest.len(),
                located.payload.len()
            )));
        }
        for (entry, layer) in manifest.iter().zip(&located.payload) {
            if entry.digest != layer.diff_id() {
                return Err(CracError::malformed(format!(
                    "segment {} is {} in metadata but layer carries {}",
                    entry.index,
                    entry.digest,
                    layer.diff_id()
                )));
            }
        }
    } else {
        debug!("Metadata has no segment manifest, skipping cross-check");
    }

    let segments = located
        .payload
        .iter()
        .enumerate()
        .map(|(index, layer)| layer.decompress(index))
        .collect::<CracResult<Vec<_>>>()?;

    let files = extract(&segments, opts.destination(), opts.permission)?;

    info!(
        image = %target,
        files,
        layers = image.layers().len(),
        dest = %opts.destination().display(),
        "Cache restored"
    );

    Ok(PullOutcome {
        target,
        files,
        layers: image.layers().len(),
    })
}

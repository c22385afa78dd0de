//! Cache image codec
//!
//! Turns a set of files into a reproducible OCI image and back:
//!
//! - `key` derives the image tag from dependency files and extra keys
//! - `archive` packs files into deterministic tar segments
//! - `image` compresses segments into layers and writes the image config
//! - `locate` finds the payload and metadata layers of a pulled image
//! - `meta` carries the schema version and gates incompatible images
//! - `extract` restores segments into a directory
//!
//! The same inputs always produce byte-identical layers, so a registry
//! deduplicates them and a second push of unchanged files is a no-op.

pub mod archive;
pub mod extract;
pub mod fileset;
pub mod image;
pub mod key;
pub mod locate;
pub mod meta;
pub mod pipeline;

pub use archive::{build, ArchiveSegment, ChunkLimit};
pub use extract::{extract, FilePermission};
pub use fileset::{FileSet, KeySet};
pub use image::{assemble, CacheImage, Layer, LayerRole, Platform};
pub use key::{derive, CacheTag, DEFAULT_TAG};
pub use locate::{locate, Located};
pub use meta::{check, MetaRecord, VersionRange, SCHEMA_VERSION};
pub use pipeline::{pull, push, PullOutcome, PushOutcome};

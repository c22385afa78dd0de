//! crac - container registry as cache
//!
//! Packs build caches into reproducible OCI images tagged by a hash of
//! their inputs, pushes them to any OCI registry (or an image-layout
//! directory), and restores them on a later run.

pub mod cache;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod options;
pub mod registry;
pub mod ui;

pub use error::{CracError, CracResult};

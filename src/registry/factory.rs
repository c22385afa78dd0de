//! Transport factory
//!
//! Picks the transport that matches a repository reference.

use crate::registry::layout::OciLayout;
use crate::registry::reference::Repository;
use crate::registry::remote::OciRegistry;
use crate::registry::transport::{RegistryTransport, TlsMode};

/// Create the transport for a repository
///
/// `oci:` repositories use the on-disk layout; everything else goes to a
/// remote registry using `tls`.
pub fn create_transport(repository: &Repository, tls: TlsMode) -> Box<dyn RegistryTransport> {
    match repository {
        Repository::Layout(_) => Box::new(OciLayout::new()),
        Repository::Remote { .. } => Box::new(OciRegistry::new(tls)),
    }
}

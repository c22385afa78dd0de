//! Registry transports for cache images
//!
//! Cache images can live in:
//! - a remote OCI distribution registry (`ghcr.io/org/cache`)
//! - an OCI image layout directory on disk (`oci:./cache`)

mod factory;
mod layout;
mod reference;
mod remote;
mod transport;

pub use factory::create_transport;
pub use layout::{OciLayout, REF_NAME_ANNOTATION};
pub use reference::{Repository, Target, DEFAULT_REGISTRY};
pub use remote::OciRegistry;
pub use transport::{RegistryAuth, RegistryTransport, TlsMode};

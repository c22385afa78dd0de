//! CLI command implementations

pub mod config;
pub mod key;
pub mod login;
pub mod pull;
pub mod push;

pub use config::execute as config;
pub use key::execute as key;
pub use login::{login, logout};
pub use pull::execute as pull;
pub use push::execute as push;

//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// crac - container registry as cache
///
/// Packs build caches into OCI images keyed by a hash of their inputs,
/// and restores them from any OCI registry.
#[derive(Parser, Debug)]
#[command(name = "crac")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CRAC_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a cache image from files and push it
    Push(PushArgs),

    /// Pull a cache image and extract it
    Pull(PullArgs),

    /// Print the cache tag for the given inputs
    Key(KeyArgs),

    /// Store credentials for a registry
    Login(LoginArgs),

    /// Remove stored credentials for a registry
    Logout(LogoutArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Inputs that determine the cache tag
#[derive(Args, Debug, Default, Clone)]
pub struct InputArgs {
    /// Dependency file(s) hashed into the tag (glob supported)
    #[arg(short, long = "dep")]
    pub deps: Vec<String>,

    /// Extra key(s) hashed into the tag
    #[arg(short, long = "key")]
    pub keys: Vec<String>,

    /// Working directory patterns are resolved against (defaults to current directory)
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Cache platform as os/arch (defaults to the host)
    #[arg(short = 'P', long)]
    pub platform: Option<String>,

    /// Use unknown/unknown as the cache platform
    #[arg(long, conflicts_with = "platform")]
    pub unknown_platform: bool,

    /// Merge a named profile from the config file
    #[arg(long)]
    pub profile: Option<String>,

    /// Read a TOML profile from a file (overrides --profile)
    #[arg(long, value_name = "PATH")]
    pub profile_file: Option<PathBuf>,

    /// Read a TOML profile from stdin (overrides --profile and --profile-file)
    #[arg(long)]
    pub profile_stdin: bool,
}

/// How to reach the registry
#[derive(Args, Debug, Default, Clone)]
pub struct RegistryArgs {
    /// Registry username
    #[arg(short, long, env = "CRAC_USERNAME")]
    pub username: Option<String>,

    /// Registry password
    #[arg(short, long, env = "CRAC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Use plain HTTP
    #[arg(long)]
    pub force_http: bool,
}

/// Arguments for the push command
#[derive(Parser, Debug)]
pub struct PushArgs {
    /// Repository to push to (e.g. ghcr.io/org/cache or oci:./dir)
    pub repository: Option<String>,

    /// Cache file(s) to store (glob supported)
    #[arg(short, long = "file")]
    pub files: Vec<String>,

    /// Push under this tag instead of the derived one
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Maximum bytes per layer, e.g. 64MiB (0 = single layer)
    #[arg(long)]
    pub chunk_size: Option<String>,

    /// Do nothing if the tag already exists
    #[arg(long)]
    pub skip_existing: bool,

    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

/// Arguments for the pull command
#[derive(Parser, Debug)]
pub struct PullArgs {
    /// Repository to pull from (e.g. ghcr.io/org/cache or oci:./dir)
    pub repository: Option<String>,

    /// Pull this tag instead of the derived one
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Octal mode for extracted files (default 0755)
    #[arg(long)]
    pub perm: Option<String>,

    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

/// Arguments for the key command
#[derive(Parser, Debug)]
pub struct KeyArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

/// Arguments for the login command
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Registry host (e.g. ghcr.io)
    pub registry: String,

    /// Registry username
    #[arg(short, long, env = "CRAC_USERNAME")]
    pub username: String,

    /// Registry password
    #[arg(short, long, env = "CRAC_PASSWORD", hide_env_values = true)]
    pub password: String,
}

/// Arguments for the logout command
#[derive(Parser, Debug)]
pub struct LogoutArgs {
    /// Registry host (e.g. ghcr.io)
    pub registry: String,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

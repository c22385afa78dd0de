//! crac - container registry as cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use crac::cli::{commands, Cli, Commands};
use crac::config::{Config, ConfigManager};
use crac::credentials::CredentialStore;
use crac::error::CracResult;
use crac::ui::UiContext;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CracResult<()> {
    let cli = Cli::parse();

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(&cli, &config);
    debug!(config = %config_manager.path().display(), "Loaded configuration");

    let ctx = UiContext::detect().with_quiet(cli.quiet);
    let store = CredentialStore::new(auth_path(&config));

    match cli.command {
        Commands::Push(args) => commands::push(args, &config, &store, &ctx).await,
        Commands::Pull(args) => commands::pull(args, &config, &store, &ctx).await,
        Commands::Key(args) => commands::key(args, &config).await,
        Commands::Login(args) => commands::login(args, &store, &ctx).await,
        Commands::Logout(args) => commands::logout(args, &store, &ctx).await,
        Commands::Config(args) => commands::config(args, &config, &config_manager, &ctx).await,
    }
}

/// -q = error, default = warn, -v = info, -vv = debug; RUST_LOG wins when set
fn init_logging(cli: &Cli, config: &Config) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("crac={}", level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

/// CRAC_AUTH_FILE > config `registry.auth_file` > default location
fn auth_path(config: &Config) -> PathBuf {
    std::env::var_os("CRAC_AUTH_FILE")
        .map(PathBuf::from)
        .or_else(|| config.registry.auth_file.clone())
        .unwrap_or_else(ConfigManager::default_auth_path)
}

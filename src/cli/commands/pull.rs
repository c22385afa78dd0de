//! Pull command - fetch a cache image and restore its files

use crate::cache;
use crate::cli::args::PullArgs;
use crate::config::Config;
use crate::credentials::{resolve_auth, CredentialStore};
use crate::error::CracResult;
use crate::options::PullOptions;
use crate::registry::create_transport;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the pull command
pub async fn execute(
    args: PullArgs,
    config: &Config,
    store: &CredentialStore,
    ctx: &UiContext,
) -> CracResult<()> {
    let opts = PullOptions::resolve(&args, config)?;
    let auth = resolve_auth(&opts.registry.repository, &opts.registry.credentials, store).await?;
    let transport = create_transport(&opts.registry.repository, opts.registry.tls);

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start(&format!("Pulling from {}...", opts.registry.repository));

    let outcome = match cache::pull(&opts, transport.as_ref(), &auth).await {
        Ok(outcome) => outcome,
        Err(e) => {
            spinner.stop_error("Pull failed");
            return Err(e);
        }
    };

    spinner.stop(&format!("Pulled {}", outcome.target));
    ui::step_ok_detail(
        ctx,
        &format!("Restored {} file(s)", outcome.files),
        &opts.destination().display().to_string(),
    );

    Ok(())
}

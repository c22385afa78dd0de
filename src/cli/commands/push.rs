//! Push command - pack files into a cache image and push it

use crate::cache;
use crate::cli::args::PushArgs;
use crate::config::Config;
use crate::credentials::{resolve_auth, CredentialStore};
use crate::error::CracResult;
use crate::options::PushOptions;
use crate::registry::create_transport;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the push command
pub async fn execute(
    args: PushArgs,
    config: &Config,
    store: &CredentialStore,
    ctx: &UiContext,
) -> CracResult<()> {
    let opts = PushOptions::resolve(&args, config)?;
    let auth = resolve_auth(&opts.registry.repository, &opts.registry.credentials, store).await?;
    let transport = create_transport(&opts.registry.repository, opts.registry.tls);

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start(&format!(
        "Pushing {} file(s) to {}...",
        opts.files.len(),
        opts.registry.repository
    ));

    let outcome = match cache::push(&opts, transport.as_ref(), &auth).await {
        Ok(outcome) => outcome,
        Err(e) => {
            spinner.stop_error("Push failed");
            return Err(e);
        }
    };

    match &outcome.location {
        Some(location) => {
            spinner.stop(&format!("Pushed {}", outcome.target));
            ui::key_value(ctx, "layers", &outcome.layers.to_string());
            ui::key_value(ctx, "manifest", location);
        }
        None => {
            spinner.stop(&format!("{} already exists", outcome.target));
            ui::step_info(ctx, "Skipped push (--skip-existing)");
        }
    }

    println!("{}", outcome.target);
    Ok(())
}

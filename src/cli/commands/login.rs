//! Login and logout commands - manage stored registry credentials

use crate::cli::args::{LoginArgs, LogoutArgs};
use crate::credentials::{normalize_host, CredentialStore};
use crate::error::{CracError, CracResult};
use crate::ui::{self, UiContext};

/// Execute the login command
pub async fn login(args: LoginArgs, store: &CredentialStore, ctx: &UiContext) -> CracResult<()> {
    if args.username.is_empty() || args.password.is_empty() {
        return Err(CracError::User(
            "Username and password must not be empty".to_string(),
        ));
    }

    store
        .store(&args.registry, &args.username, &args.password)
        .await?;

    ui::step_ok_detail(
        ctx,
        &format!("Logged in to {}", normalize_host(&args.registry)),
        &store.path().display().to_string(),
    );
    Ok(())
}

/// Execute the logout command
pub async fn logout(args: LogoutArgs, store: &CredentialStore, ctx: &UiContext) -> CracResult<()> {
    let host = normalize_host(&args.registry);

    if store.remove(&args.registry).await? {
        ui::step_ok(ctx, &format!("Removed credentials for {}", host));
    } else {
        let stored = store.hosts().await?;
        let hint = if stored.is_empty() {
            "No registries are logged in".to_string()
        } else {
            format!("Logged in to: {}", stored.join(", "))
        };
        ui::step_warn_hint(ctx, &format!("No credentials stored for {}", host), &hint);
    }
    Ok(())
}

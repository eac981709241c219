//! Login and logout

use colored::Colorize;

use crate::cli::{CommandContext, GlobalOptions};
use crate::error::Result;

/// Start a session; the cache is reset before the new scope applies.
pub fn login(
    opts: &GlobalOptions,
    user: &str,
    org_id: Option<&str>,
    token: Option<String>,
) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let org_id = org_id.or(ctx.config.org_id.as_deref());

    ctx.session.login(user, org_id);
    let org_id = org_id.map(str::to_string);
    ctx.save_config(opts, |config| {
        config.user_id = Some(user.to_string());
        config.org_id = org_id.clone();
        if token.is_some() {
            config.token = token;
        }
    })?;

    println!("{} Signed in as {}", "✓".green(), user.bold());
    if let Some(org) = org_id {
        println!("  Organization: {}", org);
    }
    Ok(())
}

/// End the session and drop every cached entry.
pub fn logout(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let was_signed_in = ctx.session.is_signed_in();

    ctx.session.logout();
    ctx.save_config(opts, |config| {
        config.user_id = None;
        config.token = None;
    })?;

    if was_signed_in {
        println!("{} Signed out, local cache cleared", "✓".green());
    } else {
        println!("{} Not signed in, local cache cleared", "○".dimmed());
    }
    Ok(())
}

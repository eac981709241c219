//! Organization commands

use colored::Colorize;
use serde_json::json;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::error::Result;
use crate::output;

/// Switch the active organization, clearing the previous tenant's cache.
pub fn set(opts: &GlobalOptions, org_id: &str) -> Result<()> {
    let ctx = CommandContext::new(opts)?;

    let switched = ctx.session.switch_organization(org_id);
    ctx.save_config(opts, |config| config.org_id = Some(org_id.to_string()))?;

    if switched {
        println!("{} Active organization set to: {}", "✓".green(), org_id.bold());
    } else {
        println!("{} Already in organization {}", "○".dimmed(), org_id);
    }
    Ok(())
}

/// Show the active organization.
pub fn get(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let org_id = ctx.config.require_org()?;

    match ctx.format {
        OutputFormat::Json => output::print_value(&json!({ "org_id": org_id }), ctx.format, false),
        OutputFormat::Table => {
            println!("{}", "Active Organization".bold());
            println!("  ID: {}", org_id);
            Ok(())
        }
    }
}

//! Status command implementation

use colored::Colorize;

use crate::cli::{CommandContext, GlobalOptions};
use crate::config::Config;
use crate::error::Result;

/// Display session and cache status
pub fn run(opts: &GlobalOptions) -> Result<()> {
    println!("{}\n", "pbcache Status".bold());

    let config_path = Config::resolve_path(opts.config_ref())?;
    if config_path.exists() {
        println!("Config file: {}", config_path.display().to_string().cyan());
    } else {
        println!(
            "Config file: {} {}",
            config_path.display().to_string().cyan(),
            "(not created yet)".dimmed()
        );
    }

    let ctx = CommandContext::new(opts)?;
    println!("Server: {}", ctx.config.base_url());
    println!();

    match ctx.config.user_id {
        Some(ref user) => println!("{} Signed in as {}", "✓".green(), user),
        None => {
            println!("{} Not signed in", "✗".red());
            println!("  → Run 'pbcache login --user <USER>' to start a session");
        }
    }

    match ctx.config.org_id {
        Some(ref org) => println!("{} Organization: {}", "✓".green(), org),
        None => println!("{} No organization set", "○".dimmed()),
    }

    if ctx.config.token.is_some() {
        println!("{} Auth token configured", "✓".green());
    } else {
        println!("{} No auth token", "○".dimmed());
    }

    if ctx.cache_enabled {
        let stats = ctx.store().persistent().stats();
        println!(
            "{} Cache enabled ({} entries, TTL {}s)",
            "✓".green(),
            stats.total_entries,
            ctx.config.cache.default_ttl_secs
        );
    } else {
        println!("{} Cache disabled", "○".dimmed());
    }

    Ok(())
}

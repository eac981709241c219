//! Cache management commands

use chrono::{DateTime, Local};
use serde_json::json;

use crate::cache::SqliteBackend;
use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::error::Result;

fn cache_location() -> String {
    SqliteBackend::cache_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Show cache status/statistics
pub fn status(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let stats = ctx.store().persistent().stats();
    let settings = &ctx.config.cache;

    match ctx.format {
        OutputFormat::Json => {
            let json = json!({
                "enabled": ctx.cache_enabled,
                "total_entries": stats.total_entries,
                "corrupted_entries": stats.corrupted_entries,
                "total_size_bytes": stats.total_size_bytes,
                "total_size_human": format_size(stats.total_size_bytes),
                "quota_bytes": settings.quota_bytes,
                "oldest_entry_timestamp": stats.oldest_entry,
                "newest_entry_timestamp": stats.newest_entry,
                "path": cache_location(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => {
            println!("Cache Status");
            println!("────────────────────────────────────────");
            println!("Location:       {}", cache_location());
            println!("Enabled:        {}", if ctx.cache_enabled { "yes" } else { "no" });
            println!("Entries:        {}", stats.total_entries);
            if stats.corrupted_entries > 0 {
                println!("Corrupted:      {}", stats.corrupted_entries);
            }
            println!(
                "Total size:     {} of {}",
                format_size(stats.total_size_bytes),
                format_size(usize::try_from(settings.quota_bytes).unwrap_or(usize::MAX))
            );

            if let Some(oldest) = stats.oldest_entry {
                println!("Oldest entry:   {}", format_millis(oldest));
            }
            if let Some(newest) = stats.newest_entry {
                println!("Newest entry:   {}", format_millis(newest));
            }
        }
    }

    Ok(())
}

/// Clear all cache entries
pub fn clear(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let removed = ctx.store().persistent().clear_all();

    match ctx.format {
        OutputFormat::Json => {
            let json = json!({
                "entries_removed": removed,
                "success": true,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => {
            if removed > 0 {
                println!("Cleared {} cache entries", removed);
            } else {
                println!("Cache was already empty");
            }
        }
    }

    Ok(())
}

/// Show cache path
pub fn path() -> Result<()> {
    let path = SqliteBackend::cache_dir()?;
    println!("{}", path.display());
    Ok(())
}

fn format_millis(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|d| d.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Format bytes as human-readable size
fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

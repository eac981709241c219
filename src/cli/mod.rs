//! CLI command definitions and handlers

use clap::{Parser, Subcommand};

pub mod args;
pub mod auth;
pub mod cache;
pub mod context;
pub mod org;
pub mod record;
pub mod status;

pub use crate::output::OutputFormat;
pub use args::{GlobalOptions, ListArgs};
pub use context::CommandContext;

/// pbcache - cached, tenant-scoped PocketBase record client
#[derive(Parser, Debug)]
#[command(name = "pbcache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (table, json)
    #[arg(
        long,
        global = true,
        env = "PBCACHE_FORMAT",
        default_value = "table",
        hide_env = true
    )]
    pub format: OutputFormat,

    /// Override the active organization for this run
    #[arg(long, global = true, env = "PBCACHE_ORG_ID", hide_env = true)]
    pub org: Option<String>,

    /// Override config file location
    #[arg(long, global = true, env = "PBCACHE_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "PBCACHE_DEBUG", hide_env = true)]
    pub debug: bool,

    /// Bypass the local cache, fetch fresh data from the server
    #[arg(long, global = true, env = "PBCACHE_NO_CACHE", hide_env = true)]
    pub no_cache: bool,

    /// PocketBase server address for this run
    #[arg(long, global = true, env = "PBCACHE_API_HOST", hide_env = true)]
    pub api_host: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show session and cache status
    Status,

    /// Start a session
    Login {
        /// User ID
        #[arg(long, short = 'u')]
        user: String,

        /// Organization to start in
        #[arg(long = "org-id")]
        org_id: Option<String>,

        /// Auth token sent with every request
        #[arg(long, env = "PBCACHE_TOKEN", hide_env = true)]
        token: Option<String>,
    },

    /// End the session and drop every cached entry
    Logout,

    /// Manage the active organization
    #[command(subcommand)]
    Org(OrgCommands),

    /// Read and write collection records
    #[command(subcommand)]
    Record(RecordCommands),

    /// Manage the local cache
    #[command(subcommand)]
    Cache(CacheCommands),
}

/// Organization subcommands
#[derive(Subcommand, Debug)]
pub enum OrgCommands {
    /// Switch to another organization (clears the cache)
    Set {
        /// Organization ID
        org_id: String,
    },

    /// Show the active organization
    Get,
}

/// Record subcommands
#[derive(Subcommand, Debug)]
pub enum RecordCommands {
    /// List records of a collection
    #[command(
        visible_alias = "ls",
        after_help = "EXAMPLES:\n  \
            pbcache record list edges\n  \
            pbcache record list things --sort -created --per-page 50\n  \
            pbcache record list things --filter 'name ~ \"sensor\"' --refresh"
    )]
    List {
        /// Collection name
        collection: String,

        #[command(flatten)]
        list: ListArgs,

        /// Skip every cache layer
        #[arg(long)]
        refresh: bool,
    },

    /// Show one record
    Get {
        collection: String,
        id: String,

        /// Skip every cache layer
        #[arg(long)]
        refresh: bool,
    },

    /// Create a record from a JSON body
    Create {
        collection: String,

        /// JSON object with the record fields
        #[arg(long, short = 'd')]
        data: String,
    },

    /// Patch a record with a JSON body
    Update {
        collection: String,
        id: String,

        /// JSON object with the fields to change
        #[arg(long, short = 'd')]
        data: String,
    },

    /// Delete a record
    Delete { collection: String, id: String },
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Status,

    /// Drop every cached entry
    Clear,

    /// Print the cache directory
    Path,
}

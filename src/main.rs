//! pbcache CLI - cached PocketBase record client

use clap::Parser;

use pbcache::cli::{
    self, CacheCommands, Cli, Commands, GlobalOptions, OrgCommands, RecordCommands,
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    log::debug!("pbcache {} starting", env!("CARGO_PKG_VERSION"));

    let opts = GlobalOptions::from_cli(&cli);

    let result = match cli.command {
        Commands::Status => cli::status::run(&opts),
        Commands::Login {
            user,
            org_id,
            token,
        } => cli::auth::login(&opts, &user, org_id.as_deref(), token),
        Commands::Logout => cli::auth::logout(&opts),
        Commands::Org(org_cmd) => match org_cmd {
            OrgCommands::Set { org_id } => cli::org::set(&opts, &org_id),
            OrgCommands::Get => cli::org::get(&opts),
        },
        Commands::Record(record_cmd) => match record_cmd {
            RecordCommands::List {
                collection,
                list,
                refresh,
            } => cli::record::list(&opts, &collection, &list, refresh).await,
            RecordCommands::Get {
                collection,
                id,
                refresh,
            } => cli::record::get(&opts, &collection, &id, refresh).await,
            RecordCommands::Create { collection, data } => {
                cli::record::create(&opts, &collection, &data).await
            }
            RecordCommands::Update {
                collection,
                id,
                data,
            } => cli::record::update(&opts, &collection, &id, &data).await,
            RecordCommands::Delete { collection, id } => {
                cli::record::delete(&opts, &collection, &id).await
            }
        },
        Commands::Cache(cache_cmd) => match cache_cmd {
            CacheCommands::Status => cli::cache::status(&opts),
            CacheCommands::Clear => cli::cache::clear(&opts),
            CacheCommands::Path => cli::cache::path(),
        },
    };

    result?;
    Ok(())
}

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sdb::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Cli::parse();
    let config = sdb_config::Config::load(&args.config)?;

    match args.command {
        Commands::Run { shard_id, quorum_id, peer } => {
            cli::run(&config, shard_id, quorum_id, peer).await?;
        }
        Commands::ShowConfig => {
            cli::show_config(&config)?;
        }
        Commands::Route { database, table, op } => {
            cli::route(&config, &database, &table, op).await?;
        }
    }

    Ok(())
}

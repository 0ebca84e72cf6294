//! pokedex-sync daemon entry point
//!
//! ## Usage
//!
//! ```bash
//! # Fetch pokemons 1..=151 into the CSV file
//! pokedex-sync fetch --from 1 --to 151
//!
//! # Enrich the CSV content with ability effects and save the JSON cache
//! pokedex-sync refresh
//!
//! # Show what the CSV file holds
//! pokedex-sync list
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pokedex_sync::{Config, CsvStorage, Fetcher, JsonCache, PokeApiClient, Refresher};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pokedex-sync")]
#[command(about = "Fetch pokemons from PokeAPI and enrich them with ability effects")]
struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "pokedex-sync.toml")]
    config: PathBuf,

    /// CSV file (overrides config file)
    #[arg(long, env = "POKEDEX_CSV_PATH")]
    csv_path: Option<PathBuf>,

    /// JSON cache file (overrides config file)
    #[arg(long, env = "POKEDEX_CACHE_PATH")]
    cache_path: Option<PathBuf>,

    /// PokeAPI base URL (overrides config file)
    #[arg(long, env = "POKEDEX_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch an inclusive ID range and replace the CSV file
    Fetch {
        #[arg(long)]
        from: u32,
        #[arg(long)]
        to: u32,
    },
    /// Enrich pokemons from the CSV file and save them to the JSON cache
    Refresh,
    /// Print the pokemons held in the CSV file
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("pokedex_sync=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(csv_path) = args.csv_path {
        config.storage.csv_path = csv_path;
    }
    if let Some(cache_path) = args.cache_path {
        config.storage.cache_path = cache_path;
    }
    if let Some(api_url) = args.api_url {
        config.api.base_url = api_url;
    }

    info!(
        csv = %config.storage.csv_path.display(),
        cache = %config.storage.cache_path.display(),
        api = %config.api.base_url,
        "Starting pokedex-sync"
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            ctrl_c.cancel();
        }
    });

    let storage = Arc::new(CsvStorage::new(
        config.storage.csv_path.clone(),
        config.pipeline.parse_workers,
    ));

    match args.command {
        Command::Fetch { from, to } => {
            let client = Arc::new(PokeApiClient::new(&config.api)?);
            let fetcher = Fetcher::new(client, storage, config.pipeline.clone().into());

            let outcome = fetcher.fetch(&cancel, from, to).await?;
            for failure in outcome.failures.iter() {
                error!(error = %failure, "Fetch failure");
            }
            println!(
                "fetched {} of {} pokemons ({} dropped)",
                outcome.pokemons.len(),
                outcome.requested,
                outcome.dropped()
            );
        }
        Command::Refresh => {
            let client = Arc::new(PokeApiClient::new(&config.api)?);
            let cache = Arc::new(JsonCache::new(config.storage.cache_path.clone()));
            let refresher = Refresher::new(storage, cache, client, config.pipeline.clone().into());

            let outcome = refresher.refresh(&cancel).await?;
            for failure in outcome.failures.iter() {
                error!(error = %failure, "Refresh failure");
            }
            println!(
                "refreshed {} of {} pokemons ({} dropped)",
                outcome.pokemons.len(),
                outcome.received,
                outcome.dropped()
            );
        }
        Command::List => {
            let mut pokemons = storage.read_all()?;
            pokemons.sort_by_key(|p| p.id);
            for p in &pokemons {
                println!(
                    "{:>5} {:<20} h={:<4} w={:<5} abilities={}",
                    p.id,
                    p.name,
                    p.height,
                    p.weight,
                    p.ability_urls.len()
                );
            }
        }
    }

    Ok(())
}

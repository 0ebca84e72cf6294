//! pokedex-sync - concurrent Pokémon fetch and ability enrichment
//!
//! Two pipelines share one shape: a bounded pool of workers fans out remote
//! calls, a single aggregator fans results back in, and a shared
//! cancellation token stops outstanding work after the first failure.
//!
//! - **Fetcher**: PokeAPI `/pokemon/{id}` for an ID range → CSV file
//! - **Refresher**: CSV file → ability effects per pokemon → JSON cache
//!
//! ## Degraded runs
//!
//! A failed fetch or ability lookup drops the affected pokemon but does not
//! fail the run. Both outcomes carry a [`FailureReport`] and a dropped count;
//! callers needing completeness must check them.

pub mod api;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod refresher;
pub mod storage;

pub use api::{AbilityResolver, PokeApiClient, PokemonSource};
pub use config::Config;
pub use error::{ApiError, PipelineError, Result, StorageError};
pub use fetcher::{FetchOutcome, Fetcher, FetcherConfig};
pub use models::{Ability, FailureReport, Pokemon};
pub use refresher::{RefreshOutcome, Refresher, RefresherConfig};
pub use storage::{CsvStorage, JsonCache, PokemonReader, PokemonSaver, PokemonStream, PokemonWriter};

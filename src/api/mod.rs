//! Remote collaborators of the pipelines
//!
//! - [`PokemonSource`]: one primary lookup per Pokémon ID
//! - [`AbilityResolver`]: one secondary lookup per ability URL
//!
//! Neither trait batches or retries. Deadlines belong to the implementation
//! ([`PokeApiClient`] carries a per-request timeout), never to the pipelines.

pub mod client;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::models::{Ability, Pokemon};

pub use client::PokeApiClient;

#[async_trait]
pub trait PokemonSource: Send + Sync {
    async fn fetch_pokemon(&self, id: u32) -> Result<Pokemon, ApiError>;
}

#[async_trait]
pub trait AbilityResolver: Send + Sync {
    async fn fetch_ability(&self, url: &str) -> Result<Ability, ApiError>;
}

//! PokeAPI HTTP client

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{AbilityResolver, PokemonSource};
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::models::{Ability, AbilityResponse, Pokemon, PokemonResponse};

/// Talks to a PokeAPI-compatible service over HTTP
#[derive(Clone)]
pub struct PokeApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl PokeApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn pokemon_url(&self, id: u32) -> String {
        format!("{}/pokemon/{}", self.base_url, id)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        debug!(url, "GET");
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PokemonSource for PokeApiClient {
    async fn fetch_pokemon(&self, id: u32) -> Result<Pokemon, ApiError> {
        let resp: PokemonResponse = self.get_json(&self.pokemon_url(id)).await?;
        Ok(resp.into())
    }
}

#[async_trait]
impl AbilityResolver for PokeApiClient {
    async fn fetch_ability(&self, url: &str) -> Result<Ability, ApiError> {
        let resp: AbilityResponse = self.get_json(url).await?;
        Ok(resp.into())
    }
}

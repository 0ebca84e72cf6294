//! JSON cache of refreshed pokemons

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{ensure_parent, tmp_path, PokemonSaver};
use crate::error::StorageError;
use crate::models::Pokemon;

#[derive(Debug, Clone)]
pub struct JsonCache {
    path: PathBuf,
}

impl JsonCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Vec<Pokemon>, StorageError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl PokemonSaver for JsonCache {
    async fn save(&self, cancel: &CancellationToken, pokemons: &[Pokemon]) -> Result<(), StorageError> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let data = serde_json::to_vec_pretty(pokemons)?;
        ensure_parent(&self.path)?;
        let tmp = tmp_path(&self.path);

        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(path = %tmp.display(), "Save cancelled before write completed");
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(StorageError::Cancelled);
            }
            res = tokio::fs::write(&tmp, &data) => res?,
        }
        tokio::fs::rename(&tmp, &self.path).await?;

        info!(count = pokemons.len(), path = %self.path.display(), "Saved refreshed pokemons");
        Ok(())
    }
}

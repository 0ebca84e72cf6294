//! Persistence collaborators
//!
//! ## Storage Layout
//!
//! ```text
//! resources/
//! ├── pokemons.csv    # written by fetch (full replace), read by refresh
//! └── pokemons.json   # refreshed pokemons with effect entries
//! ```
//!
//! Both files are replaced atomically: content goes to a sibling `.tmp` file
//! which is then renamed over the target.

pub mod cache;
pub mod csv_store;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, StorageError};
use crate::models::Pokemon;

pub use self::cache::JsonCache;
pub use self::csv_store::CsvStorage;

/// One partition of parsed pokemons. Read/parse failures arrive in-band.
pub type PokemonStream = mpsc::Receiver<Result<Pokemon, PipelineError>>;

/// Full-replace persistence for the fetch side
#[async_trait]
pub trait PokemonWriter: Send + Sync {
    async fn write(&self, pokemons: &[Pokemon]) -> Result<(), StorageError>;
}

/// Persistence for the refresh side
#[async_trait]
pub trait PokemonSaver: Send + Sync {
    async fn save(&self, cancel: &CancellationToken, pokemons: &[Pokemon]) -> Result<(), StorageError>;
}

/// Streaming read side consumed by the refresher.
///
/// Spawns its tasks on the current tokio runtime and returns immediately.
/// Implementations fire `cancel` on any read or parse failure.
pub trait PokemonReader: Send + Sync {
    fn read(&self, cancel: &CancellationToken) -> Vec<PokemonStream>;
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

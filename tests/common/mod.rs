//! In-memory collaborators shared by the pipeline tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pokedex_sync::{
    Ability, AbilityResolver, ApiError, PipelineError, Pokemon, PokemonReader, PokemonSaver,
    PokemonSource, PokemonStream, PokemonWriter, StorageError,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub fn pokemon(id: u32, abilities: &[&str]) -> Pokemon {
    Pokemon {
        id,
        name: format!("pokemon-{id}"),
        height: id * 2,
        weight: id * 10,
        ability_urls: abilities.iter().map(|a| a.to_string()).collect(),
        effect_entries: Vec::new(),
    }
}

// =============================================================================
// Primary source
// =============================================================================

#[derive(Default)]
pub struct FakeSource {
    failing: HashSet<u32>,
    delay: Duration,
    calls: Mutex<Vec<u32>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, id: u32) -> Self {
        self.failing.insert(id);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PokemonSource for FakeSource {
    async fn fetch_pokemon(&self, id: u32) -> Result<Pokemon, ApiError> {
        self.calls.lock().unwrap().push(id);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(&id) {
            return Err(ApiError::Status {
                status: 500,
                url: format!("fake://pokemon/{id}"),
            });
        }
        let mut p = pokemon(id, &["fake://ability/1"]);
        // sources may hand back stale enrichment; the fetcher must clear it
        p.effect_entries.push("stale".to_string());
        Ok(p)
    }
}

// =============================================================================
// Secondary resolver
// =============================================================================

#[derive(Default)]
pub struct FakeResolver {
    abilities: HashMap<String, Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ability(mut self, url: &str, effects: &[&str]) -> Self {
        self.abilities
            .insert(url.to_string(), effects.iter().map(|e| e.to_string()).collect());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AbilityResolver for FakeResolver {
    async fn fetch_ability(&self, url: &str) -> Result<Ability, ApiError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.abilities.get(url) {
            Some(effects) => Ok(Ability {
                effect_entries: effects.clone(),
            }),
            None => Err(ApiError::Status {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

// =============================================================================
// Sinks
// =============================================================================

#[derive(Default)]
pub struct MemoryWriter {
    pub fail: bool,
    writes: Mutex<Vec<Vec<Pokemon>>>,
}

impl MemoryWriter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn writes(&self) -> Vec<Vec<Pokemon>> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl PokemonWriter for MemoryWriter {
    async fn write(&self, pokemons: &[Pokemon]) -> Result<(), StorageError> {
        if self.fail {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.writes.lock().unwrap().push(pokemons.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySaver {
    pub fail: bool,
    saves: Mutex<Vec<Vec<Pokemon>>>,
}

impl MemorySaver {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn saves(&self) -> Vec<Vec<Pokemon>> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl PokemonSaver for MemorySaver {
    async fn save(&self, cancel: &CancellationToken, pokemons: &[Pokemon]) -> Result<(), StorageError> {
        if self.fail || cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        self.saves.lock().unwrap().push(pokemons.to_vec());
        Ok(())
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Serves fixed partitions; optionally cancels the run while opening them
pub struct VecReader {
    partitions: Vec<Vec<Result<Pokemon, PipelineError>>>,
    cancel_on_read: bool,
}

impl VecReader {
    pub fn new(partitions: Vec<Vec<Pokemon>>) -> Self {
        Self {
            partitions: partitions
                .into_iter()
                .map(|p| p.into_iter().map(Ok).collect())
                .collect(),
            cancel_on_read: false,
        }
    }

    pub fn cancelling(mut self) -> Self {
        self.cancel_on_read = true;
        self
    }
}

impl PokemonReader for VecReader {
    fn read(&self, cancel: &CancellationToken) -> Vec<PokemonStream> {
        if self.cancel_on_read {
            cancel.cancel();
        }
        self.partitions
            .iter()
            .map(|partition| {
                let (tx, rx) = mpsc::channel(partition.len().max(1));
                for item in partition {
                    let item = match item {
                        Ok(p) => Ok(p.clone()),
                        Err(e) => Err(PipelineError::Read(e.to_string())),
                    };
                    tx.try_send(item).expect("channel sized for partition");
                }
                rx
            })
            .collect()
    }
}

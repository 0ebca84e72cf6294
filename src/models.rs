//! Domain records and PokeAPI wire shapes

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Separator used when ability URLs are flattened into one CSV field
pub const ABILITY_SEPARATOR: &str = "|";

/// A Pokémon as it moves through the pipelines.
///
/// `effect_entries` stays empty until the refresh stage enriches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pokemon {
    pub id: u32,
    pub name: String,
    pub height: u32,
    pub weight: u32,
    /// Ability URLs in API order
    #[serde(default)]
    pub ability_urls: Vec<String>,
    /// Resolved effect descriptions, in ability order
    #[serde(default)]
    pub effect_entries: Vec<String>,
}

impl Pokemon {
    /// Ability URLs joined with [`ABILITY_SEPARATOR`]
    pub fn flat_ability_urls(&self) -> String {
        self.ability_urls.join(ABILITY_SEPARATOR)
    }

    pub fn is_enriched(&self) -> bool {
        !self.effect_entries.is_empty()
    }
}

/// Split a flattened ability field back into URLs. Empty tokens are dropped.
pub fn split_ability_urls(flat: &str) -> Vec<String> {
    flat.split(ABILITY_SEPARATOR)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(String::from)
        .collect()
}

/// Secondary attributes resolved from one ability URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ability {
    pub effect_entries: Vec<String>,
}

// ============================================================================
// PokeAPI responses
// ============================================================================

/// `GET /pokemon/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct PokemonResponse {
    pub id: u32,
    pub name: String,
    pub height: u32,
    pub weight: u32,
    #[serde(default)]
    pub abilities: Vec<AbilitySlot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbilitySlot {
    pub ability: NamedResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedResource {
    pub name: String,
    pub url: String,
}

impl From<PokemonResponse> for Pokemon {
    fn from(resp: PokemonResponse) -> Self {
        Self {
            id: resp.id,
            name: resp.name,
            height: resp.height,
            weight: resp.weight,
            ability_urls: resp.abilities.into_iter().map(|slot| slot.ability.url).collect(),
            effect_entries: Vec::new(),
        }
    }
}

/// `GET /ability/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct AbilityResponse {
    #[serde(default)]
    pub effect_entries: Vec<EffectEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EffectEntry {
    pub effect: String,
}

impl From<AbilityResponse> for Ability {
    fn from(resp: AbilityResponse) -> Self {
        Self {
            effect_entries: resp.effect_entries.into_iter().map(|e| e.effect).collect(),
        }
    }
}

// ============================================================================
// Run outcomes
// ============================================================================

/// Failures observed by a pipeline run that did not abort it
#[derive(Debug, Default)]
pub struct FailureReport {
    failures: Vec<PipelineError>,
}

impl FailureReport {
    pub fn record(&mut self, err: PipelineError) {
        self.failures.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineError> {
        self.failures.iter()
    }

    /// Remove and return the first read or parse failure, if any
    pub fn take_source_failure(&mut self) -> Option<PipelineError> {
        let idx = self
            .failures
            .iter()
            .position(|e| matches!(e, PipelineError::Read(_) | PipelineError::Parse { .. }))?;
        Some(self.failures.remove(idx))
    }
}

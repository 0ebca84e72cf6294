//! Configuration for pokedex-sync

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// PokeAPI base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// CSV file written by `fetch` and read by `refresh`
    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,

    /// JSON file holding refreshed pokemons
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Concurrent primary fetches
    #[serde(default = "default_fetch_workers")]
    pub fetch_workers: usize,

    /// CSV parse workers (one output stream each)
    #[serde(default = "default_parse_workers")]
    pub parse_workers: usize,

    /// Concurrent ability enrichment tasks
    #[serde(default = "default_enrich_workers")]
    pub enrich_workers: usize,

    /// IDs above this get `burst_delay_ms` before their fetch
    #[serde(default = "default_burst_threshold")]
    pub burst_threshold_id: u32,

    #[serde(default = "default_burst_delay")]
    pub burst_delay_ms: u64,
}

fn default_base_url() -> String {
    "https://pokeapi.co/api/v2".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("resources/pokemons.csv")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("resources/pokemons.json")
}

fn default_fetch_workers() -> usize {
    16
}

fn default_parse_workers() -> usize {
    4
}

fn default_enrich_workers() -> usize {
    16
}

fn default_burst_threshold() -> u32 {
    1000
}

fn default_burst_delay() -> u64 {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
            cache_path: default_cache_path(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_workers: default_fetch_workers(),
            parse_workers: default_parse_workers(),
            enrich_workers: default_enrich_workers(),
            burst_threshold_id: default_burst_threshold(),
            burst_delay_ms: default_burst_delay(),
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.pipeline;
        if p.fetch_workers == 0 || p.parse_workers == 0 || p.enrich_workers == 0 {
            anyhow::bail!("worker counts must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_for_missing_file() {
        let config = Config::load(Path::new("/nonexistent/pokedex-sync.toml")).unwrap();
        assert_eq!(config.api.base_url, "https://pokeapi.co/api/v2");
        assert_eq!(config.pipeline.fetch_workers, 16);
        assert_eq!(config.pipeline.burst_threshold_id, 1000);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[storage]
csv_path = "/tmp/pokemons.csv"

[pipeline]
fetch_workers = 4
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.storage.csv_path, PathBuf::from("/tmp/pokemons.csv"));
        assert_eq!(config.storage.cache_path, PathBuf::from("resources/pokemons.json"));
        assert_eq!(config.pipeline.fetch_workers, 4);
        assert_eq!(config.pipeline.enrich_workers, 16);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nparse_workers = 0").unwrap();
        assert!(Config::load(file.path()).is_err());
    }
}

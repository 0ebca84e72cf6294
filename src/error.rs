//! Error types for pokedex-sync

use thiserror::Error;

/// Failure of a single remote call against the Pokémon API
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Http(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed record at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Cannot store pokemon {id}: {reason}")]
    InvalidRecord { id: u32, reason: String },

    #[error("Storage operation cancelled")]
    Cancelled,
}

/// Errors raised inside a pipeline run.
///
/// Worker failures travel to the aggregator as values and end up in the
/// run's [`FailureReport`](crate::models::FailureReport). Runs return
/// `Persistence` and `Cancelled`; a refresh also returns `Read`/`Parse` when
/// its source broke.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot get id {id}: {source}")]
    Fetch {
        id: u32,
        #[source]
        source: ApiError,
    },

    #[error("cannot fetch ability {url} for pokemon {id}: {source}")]
    Ability {
        id: u32,
        url: String,
        #[source]
        source: ApiError,
    },

    #[error("cannot parse line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("cannot read pokemons: {0}")]
    Read(String),

    #[error("cannot persist pokemons: {0}")]
    Persistence(#[source] StorageError),

    #[error("pipeline cancelled: {0}")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

//! Refresher - ability enrichment over streamed pokemons
//!
//! ```text
//! reader ──> stream 0 ──> consumer 0 ──┬─> enrich task ──┐
//!        ──> stream 1 ──> consumer 1 ──┼─> enrich task ──┼──> aggregator ──> saver
//!        ──> ...                       └─> ...         ──┘
//! ```
//!
//! Each consumer spawns one enrichment task per pokemon, bounded by a shared
//! semaphore. A task resolves the pokemon's abilities one after another; if any
//! of them fails it cancels the run and the pokemon is dropped, never emitted
//! half-enriched.
//!
//! Every consumer and every task holds a clone of the result sender, so the
//! aggregator only sees the channel close once all of them are done, including
//! tasks that outlive their stream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::AbilityResolver;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::{FailureReport, Pokemon};
use crate::storage::{PokemonReader, PokemonSaver, PokemonStream};

#[derive(Debug, Clone)]
pub struct RefresherConfig {
    /// Maximum enrichment tasks in flight
    pub enrich_workers: usize,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        PipelineConfig::default().into()
    }
}

impl From<PipelineConfig> for RefresherConfig {
    fn from(config: PipelineConfig) -> Self {
        Self {
            enrich_workers: config.enrich_workers.max(1),
        }
    }
}

/// Result of a refresh run
#[derive(Debug)]
pub struct RefreshOutcome {
    /// Fully enriched pokemons, in completion order
    pub pokemons: Vec<Pokemon>,
    pub failures: FailureReport,
    /// Pokemons read from the streams
    pub received: usize,
}

impl RefreshOutcome {
    /// Pokemons read but not emitted (failed or skipped after cancellation)
    pub fn dropped(&self) -> usize {
        self.received.saturating_sub(self.pokemons.len())
    }
}

pub struct Refresher {
    reader: Arc<dyn PokemonReader>,
    saver: Arc<dyn PokemonSaver>,
    resolver: Arc<dyn AbilityResolver>,
    config: RefresherConfig,
}

impl Refresher {
    pub fn new(
        reader: Arc<dyn PokemonReader>,
        saver: Arc<dyn PokemonSaver>,
        resolver: Arc<dyn AbilityResolver>,
        config: RefresherConfig,
    ) -> Self {
        Self {
            reader,
            saver,
            resolver,
            config,
        }
    }

    /// Read, enrich and save every pokemon.
    ///
    /// Returns `Cancelled` when the run is already cancelled as a stream is
    /// about to be consumed, `Read`/`Parse` when the source broke (nothing is
    /// saved then), and `Persistence` when saving fails. Pokemons
    /// whose abilities could not be resolved are dropped and reported in the
    /// outcome.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<RefreshOutcome> {
        let run = cancel.child_token();
        let streams = self.reader.read(&run);
        info!(streams = streams.len(), "Refreshing pokemons");

        let received = Arc::new(AtomicUsize::new(0));
        let mut results = self.fan_in(&run, streams, &received)?;

        let mut pokemons = Vec::new();
        let mut failures = FailureReport::default();
        while let Some(result) = results.recv().await {
            match result {
                Ok(pokemon) => pokemons.push(pokemon),
                Err(e) => failures.record(e),
            }
        }

        let mut outcome = RefreshOutcome {
            pokemons,
            failures,
            received: received.load(Ordering::SeqCst),
        };
        if outcome.failures.is_empty() {
            info!(count = outcome.pokemons.len(), "Refreshed all pokemons");
        } else {
            warn!(
                refreshed = outcome.pokemons.len(),
                dropped = outcome.dropped(),
                failures = outcome.failures.len(),
                "Refresh finished with failures"
            );
        }

        // A broken source leaves the cache as it was
        if let Some(err) = outcome.failures.take_source_failure() {
            error!(error = %err, "Refresh aborted, nothing saved");
            return Err(err);
        }

        self.saver
            .save(cancel, &outcome.pokemons)
            .await
            .map_err(PipelineError::Persistence)?;

        Ok(outcome)
    }

    fn fan_in(
        &self,
        cancel: &CancellationToken,
        streams: Vec<PokemonStream>,
        received: &Arc<AtomicUsize>,
    ) -> Result<mpsc::UnboundedReceiver<Result<Pokemon>>> {
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let permits = Arc::new(Semaphore::new(self.config.enrich_workers));

        for (stream_id, stream) in streams.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled(format!(
                    "cannot continue processing streams, stream {} not started",
                    stream_id
                )));
            }

            tokio::spawn(consume_stream(
                stream_id,
                stream,
                Arc::clone(&self.resolver),
                Arc::clone(&permits),
                result_tx.clone(),
                cancel.clone(),
                Arc::clone(received),
            ));
        }

        Ok(result_rx)
    }
}

/// Drain one stream, spawning an enrichment task per pokemon. Stream
/// failures go straight to the aggregator.
async fn consume_stream(
    stream_id: usize,
    mut stream: PokemonStream,
    resolver: Arc<dyn AbilityResolver>,
    permits: Arc<Semaphore>,
    results: mpsc::UnboundedSender<Result<Pokemon>>,
    cancel: CancellationToken,
    received: Arc<AtomicUsize>,
) {
    while let Some(item) = stream.recv().await {
        let pokemon = match item {
            Ok(pokemon) => pokemon,
            Err(e) => {
                let _ = results.send(Err(e));
                continue;
            }
        };
        received.fetch_add(1, Ordering::SeqCst);

        if cancel.is_cancelled() {
            debug!(stream_id, id = pokemon.id, "Skipping pokemon, pipeline cancelled");
            continue;
        }

        let permit = tokio::select! {
            _ = cancel.cancelled() => continue,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        tokio::spawn(enrich(
            pokemon,
            Arc::clone(&resolver),
            results.clone(),
            cancel.clone(),
            permit,
        ));
    }
    debug!(stream_id, "Stream exhausted");
}

async fn enrich(
    mut pokemon: Pokemon,
    resolver: Arc<dyn AbilityResolver>,
    results: mpsc::UnboundedSender<Result<Pokemon>>,
    cancel: CancellationToken,
    _permit: OwnedSemaphorePermit,
) {
    let mut effects = Vec::new();
    for url in &pokemon.ability_urls {
        if cancel.is_cancelled() {
            return;
        }

        match resolver.fetch_ability(url).await {
            Ok(ability) => effects.extend(ability.effect_entries),
            Err(e) => {
                error!(id = pokemon.id, url = %url, error = %e, "cannot fetch ability");
                cancel.cancel();
                let _ = results.send(Err(PipelineError::Ability {
                    id: pokemon.id,
                    url: url.clone(),
                    source: e,
                }));
                return;
            }
        }
    }

    if cancel.is_cancelled() {
        debug!(id = pokemon.id, "Dropping enriched pokemon, pipeline cancelled");
        return;
    }

    pokemon.effect_entries = effects;
    let _ = results.send(Ok(pokemon));
}

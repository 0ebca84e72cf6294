//! Fetcher - concurrent primary fetch over an ID range
//!
//! ```text
//! id producer ──> id queue ──┬─> worker 0 ──┐
//!   [from..=to]              ├─> worker 1 ──┼──> result channel ──> aggregator ──> writer
//!                            └─> ...      ──┘
//! ```
//!
//! All workers share one cancellation token, a child of the caller's. The
//! first failed fetch cancels it:
//! - the producer stops enqueueing IDs
//! - workers that have not called the source yet exit without calling it
//! - in-flight results that land after cancellation are discarded
//! - the failing worker still forwards its failure
//!
//! Failed fetches degrade the result set. `fetch` only fails when the writer
//! does, so callers that need every ID must check [`FetchOutcome::is_complete`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::PokemonSource;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::{FailureReport, Pokemon};
use crate::storage::PokemonWriter;

/// Configuration for the fetch worker pool
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Number of worker tasks
    pub workers: usize,
    /// IDs above this are delayed before their fetch
    pub burst_threshold_id: u32,
    pub burst_delay: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        PipelineConfig::default().into()
    }
}

impl From<PipelineConfig> for FetcherConfig {
    fn from(config: PipelineConfig) -> Self {
        Self {
            workers: config.fetch_workers.max(1),
            burst_threshold_id: config.burst_threshold_id,
            burst_delay: Duration::from_millis(config.burst_delay_ms),
        }
    }
}

/// Result of a fetch run
#[derive(Debug)]
pub struct FetchOutcome {
    /// Fetched pokemons, in completion order
    pub pokemons: Vec<Pokemon>,
    pub failures: FailureReport,
    /// Size of the requested ID range
    pub requested: usize,
}

impl FetchOutcome {
    /// IDs in range that produced no pokemon (failed, skipped or discarded)
    pub fn dropped(&self) -> usize {
        self.requested.saturating_sub(self.pokemons.len())
    }

    pub fn is_complete(&self) -> bool {
        self.dropped() == 0
    }
}

pub struct Fetcher {
    source: Arc<dyn PokemonSource>,
    writer: Arc<dyn PokemonWriter>,
    config: FetcherConfig,
}

impl Fetcher {
    pub fn new(
        source: Arc<dyn PokemonSource>,
        writer: Arc<dyn PokemonWriter>,
        config: FetcherConfig,
    ) -> Self {
        Self { source, writer, config }
    }

    /// Fetch every ID in `[from, to]` and write the result, replacing what
    /// the writer held before.
    pub async fn fetch(&self, cancel: &CancellationToken, from: u32, to: u32) -> Result<FetchOutcome> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(format!(
                "fetch of ids {}..={} cancelled before start",
                from, to
            )));
        }

        let requested = if from > to { 0 } else { ((to - from) as usize).saturating_add(1) };
        info!(from, to, workers = self.config.workers, "Fetching pokemons");

        let run = cancel.child_token();
        let mut results = self.spawn_workers(&run, from, to);

        let mut pokemons = Vec::new();
        let mut failures = FailureReport::default();
        while let Some(result) = results.recv().await {
            match result {
                Ok(pokemon) => pokemons.push(pokemon),
                Err(e) => failures.record(e),
            }
        }

        let outcome = FetchOutcome {
            pokemons,
            failures,
            requested,
        };
        if outcome.is_complete() {
            info!(count = outcome.pokemons.len(), "Fetched all pokemons");
        } else {
            warn!(
                fetched = outcome.pokemons.len(),
                dropped = outcome.dropped(),
                failures = outcome.failures.len(),
                "Fetch finished with missing pokemons"
            );
        }

        self.writer
            .write(&outcome.pokemons)
            .await
            .map_err(PipelineError::Persistence)?;

        Ok(outcome)
    }

    /// Start the producer and the worker pool. The returned channel closes
    /// once every worker has exited.
    fn spawn_workers(
        &self,
        cancel: &CancellationToken,
        from: u32,
        to: u32,
    ) -> mpsc::UnboundedReceiver<Result<Pokemon>> {
        let (id_tx, id_rx) = mpsc::channel::<u32>(self.config.workers);
        let id_rx = Arc::new(Mutex::new(id_rx));
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        tokio::spawn(produce_ids(from, to, id_tx, cancel.clone()));

        for worker_id in 0..self.config.workers {
            tokio::spawn(fetch_worker(
                worker_id,
                Arc::clone(&self.source),
                Arc::clone(&id_rx),
                result_tx.clone(),
                cancel.clone(),
                self.config.clone(),
            ));
        }

        result_rx
    }
}

async fn produce_ids(from: u32, to: u32, out: mpsc::Sender<u32>, cancel: CancellationToken) {
    for id in from..=to {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(id, "Stopping id producer to avoid unnecessary fetches");
                return;
            }
            sent = out.send(id) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

async fn fetch_worker(
    worker_id: usize,
    source: Arc<dyn PokemonSource>,
    ids: Arc<Mutex<mpsc::Receiver<u32>>>,
    results: mpsc::UnboundedSender<Result<Pokemon>>,
    cancel: CancellationToken,
    config: FetcherConfig,
) {
    loop {
        let id = {
            let mut rx = ids.lock().await;
            match rx.recv().await {
                Some(id) => id,
                None => return,
            }
        };

        if id > config.burst_threshold_id && !config.burst_delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(config.burst_delay) => {}
            }
        }

        if cancel.is_cancelled() {
            debug!(worker_id, id, "Worker exiting before fetch, pipeline cancelled");
            return;
        }

        match source.fetch_pokemon(id).await {
            Ok(mut pokemon) => {
                if cancel.is_cancelled() {
                    debug!(worker_id, id, "Discarding pokemon fetched after cancellation");
                    return;
                }
                pokemon.effect_entries.clear();
                if results.send(Ok(pokemon)).is_err() {
                    return;
                }
            }
            Err(e) => {
                error!(worker_id, id, error = %e, "cannot get pokemon");
                cancel.cancel();
                let _ = results.send(Err(PipelineError::Fetch { id, source: e }));
                return;
            }
        }
    }
}

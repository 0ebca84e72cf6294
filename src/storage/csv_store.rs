//! CSV-backed pokemon store
//!
//! Reading is a two-stage pipeline:
//!
//! ```text
//! line producer ──> shared line channel ──┬─> parse worker 0 ──> stream 0
//!   (skips header)                        ├─> parse worker 1 ──> stream 1
//!                                         └─> ...
//! ```
//!
//! Every worker owns one output stream, so a pool of one yields a single
//! stream in file order.
//!
//! Records are read one line at a time, so names containing line breaks are
//! rejected on write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use csv::StringRecord;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{ensure_parent, tmp_path, PokemonReader, PokemonStream, PokemonWriter};
use crate::error::{PipelineError, StorageError};
use crate::models::{split_ability_urls, Pokemon};

pub const HEADER: [&str; 5] = ["id", "name", "height", "weight", "flat_abilities"];

const LINE_BUFFER: usize = 64;
const STREAM_BUFFER: usize = 16;

/// A non-header line of the CSV file, numbered from 1 (the header)
#[derive(Debug)]
struct RawLine {
    number: usize,
    text: String,
}

type LineItem = Result<RawLine, PipelineError>;

#[derive(Debug, Clone)]
pub struct CsvStorage {
    path: PathBuf,
    parse_workers: usize,
}

impl CsvStorage {
    pub fn new(path: impl Into<PathBuf>, parse_workers: usize) -> Self {
        Self {
            path: path.into(),
            parse_workers: parse_workers.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file at once, failing on the first malformed record
    pub fn read_all(&self) -> Result<Vec<Pokemon>, StorageError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        let mut pokemons = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            // header is line 1
            let line = i + 2;
            let pokemon = pokemon_from_record(&record)
                .map_err(|reason| StorageError::Malformed { line, reason })?;
            pokemons.push(pokemon);
        }
        Ok(pokemons)
    }

    fn write_file(&self, pokemons: &[Pokemon]) -> Result<(), StorageError> {
        if let Some(p) = pokemons.iter().find(|p| p.name.contains(['\n', '\r'])) {
            return Err(StorageError::InvalidRecord {
                id: p.id,
                reason: "name contains a line break".to_string(),
            });
        }

        ensure_parent(&self.path)?;
        let tmp = tmp_path(&self.path);

        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(HEADER)?;
        for p in pokemons {
            writer.write_record([
                p.id.to_string(),
                p.name.clone(),
                p.height.to_string(),
                p.weight.to_string(),
                p.flat_ability_urls(),
            ])?;
        }
        writer.flush()?;
        drop(writer);

        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl PokemonWriter for CsvStorage {
    async fn write(&self, pokemons: &[Pokemon]) -> Result<(), StorageError> {
        let store = self.clone();
        let owned = pokemons.to_vec();
        tokio::task::spawn_blocking(move || store.write_file(&owned))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        info!(count = pokemons.len(), path = %self.path.display(), "Wrote pokemons");
        Ok(())
    }
}

impl PokemonReader for CsvStorage {
    fn read(&self, cancel: &CancellationToken) -> Vec<PokemonStream> {
        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
        tokio::spawn(produce_lines(self.path.clone(), line_tx, cancel.clone()));

        let line_rx = Arc::new(Mutex::new(line_rx));
        (0..self.parse_workers)
            .map(|worker_id| {
                let (tx, rx) = mpsc::channel(STREAM_BUFFER);
                tokio::spawn(parse_lines(worker_id, Arc::clone(&line_rx), tx, cancel.clone()));
                rx
            })
            .collect()
    }
}

/// Emit every line after the header; on failure report it, then cancel
async fn produce_lines(path: PathBuf, out: mpsc::Sender<LineItem>, cancel: CancellationToken) {
    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            error!(path = %path.display(), error = %e, "cannot open pokemons file");
            let _ = out
                .send(Err(PipelineError::Read(format!("{}: {}", path.display(), e))))
                .await;
            cancel.cancel();
            return;
        }
    };

    let mut lines = BufReader::new(file).lines();
    let mut number = 0usize;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                info!("finishing line producer due to cancellation");
                return;
            }
            next = lines.next_line() => next,
        };

        match next {
            Ok(Some(text)) => {
                number += 1;
                if number == 1 {
                    continue;
                }
                if out.send(Ok(RawLine { number, text })).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                error!(line = number + 1, error = %e, "cannot read pokemons file");
                let _ = out
                    .send(Err(PipelineError::Read(format!("line {}: {}", number + 1, e))))
                    .await;
                cancel.cancel();
                return;
            }
        }
    }
}

async fn parse_lines(
    worker_id: usize,
    lines: Arc<Mutex<mpsc::Receiver<LineItem>>>,
    out: mpsc::Sender<Result<Pokemon, PipelineError>>,
    cancel: CancellationToken,
) {
    loop {
        let item = {
            let mut rx = lines.lock().await;
            rx.recv().await
        };

        let raw = match item {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => {
                let _ = out.send(Err(e)).await;
                continue;
            }
            None => return,
        };

        // Keep draining after cancellation so producer failures still surface
        if cancel.is_cancelled() {
            debug!(worker_id, line = raw.number, "Skipping line, pipeline cancelled");
            continue;
        }

        match parse_line(raw.number, &raw.text) {
            Ok(pokemon) => {
                if out.send(Ok(pokemon)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                error!(worker_id, error = %e, "cannot parse pokemon");
                let _ = out.send(Err(e)).await;
                cancel.cancel();
                return;
            }
        }
    }
}

fn parse_line(number: usize, text: &str) -> Result<Pokemon, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut record = StringRecord::new();
    let found = reader.read_record(&mut record).map_err(|e| PipelineError::Parse {
        line: number,
        reason: e.to_string(),
    })?;
    if !found {
        return Err(PipelineError::Parse {
            line: number,
            reason: "empty line".to_string(),
        });
    }

    pokemon_from_record(&record).map_err(|reason| PipelineError::Parse { line: number, reason })
}

fn pokemon_from_record(record: &StringRecord) -> Result<Pokemon, String> {
    if record.len() != HEADER.len() {
        return Err(format!("expected {} fields, got {}", HEADER.len(), record.len()));
    }

    let number = |idx: usize| -> Result<u32, String> {
        record[idx]
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid {} {:?}: {}", HEADER[idx], &record[idx], e))
    };

    Ok(Pokemon {
        id: number(0)?,
        name: record[1].to_string(),
        height: number(2)?,
        weight: number(3)?,
        ability_urls: split_ability_urls(&record[4]),
        effect_entries: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pikachu() -> Pokemon {
        Pokemon {
            id: 25,
            name: "pikachu".to_string(),
            height: 4,
            weight: 60,
            ability_urls: vec![
                "https://pokeapi.co/api/v2/ability/9/".to_string(),
                "https://pokeapi.co/api/v2/ability/31/".to_string(),
            ],
            effect_entries: Vec::new(),
        }
    }

    #[test]
    fn test_parse_line() {
        let pokemon = parse_line(2, "25,pikachu,4,60,https://pokeapi.co/api/v2/ability/9/|https://pokeapi.co/api/v2/ability/31/").unwrap();
        assert_eq!(pokemon, pikachu());
    }

    #[test]
    fn test_parse_line_rejects_non_numeric_fields() {
        for text in ["x,pikachu,4,60,", "25,pikachu,tall,60,", "25,pikachu,4,-1,"] {
            let err = parse_line(7, text).unwrap_err();
            assert!(matches!(err, PipelineError::Parse { line: 7, .. }), "{text}: {err}");
        }
    }

    #[test]
    fn test_parse_line_rejects_wrong_field_count() {
        let err = parse_line(3, "25,pikachu,4").unwrap_err();
        assert!(err.to_string().contains("expected 5 fields, got 3"));
    }

    #[tokio::test]
    async fn test_write_replaces_previous_content() {
        let dir = TempDir::new().unwrap();
        let store = CsvStorage::new(dir.path().join("pokemons.csv"), 1);

        let mut mew = pikachu();
        mew.id = 151;
        mew.name = "mew".to_string();

        store.write(&[pikachu(), mew.clone()]).await.unwrap();
        store.write(&[mew.clone()]).await.unwrap();

        assert_eq!(store.read_all().unwrap(), vec![mew]);
        assert!(!tmp_path(store.path()).exists());
    }

    #[tokio::test]
    async fn test_write_quotes_names_with_commas() {
        let dir = TempDir::new().unwrap();
        let store = CsvStorage::new(dir.path().join("nested/pokemons.csv"), 1);

        let mut odd = pikachu();
        odd.name = "mr, mime".to_string();
        store.write(&[odd.clone()]).await.unwrap();

        assert_eq!(store.read_all().unwrap(), vec![odd.clone()]);

        let cancel = CancellationToken::new();
        let mut streams = store.read(&cancel);
        let item = streams[0].recv().await.unwrap().unwrap();
        assert_eq!(item, odd);
    }

    #[tokio::test]
    async fn test_write_rejects_line_breaks_in_names() {
        let dir = TempDir::new().unwrap();
        let store = CsvStorage::new(dir.path().join("pokemons.csv"), 1);
        store.write(&[pikachu()]).await.unwrap();

        let mut odd = pikachu();
        odd.id = 122;
        odd.name = "mr\nmime".to_string();
        let err = store.write(&[odd]).await.unwrap_err();

        assert!(matches!(err, StorageError::InvalidRecord { id: 122, .. }));
        // previous content untouched
        assert_eq!(store.read_all().unwrap(), vec![pikachu()]);
    }

    #[test]
    fn test_read_all_reports_malformed_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pokemons.csv");
        std::fs::write(&path, "id,name,height,weight,flat_abilities\n1,a,1,1,\nbad,b,1,1,\n").unwrap();

        let err = CsvStorage::new(&path, 1).read_all().unwrap_err();
        assert!(matches!(err, StorageError::Malformed { line: 3, .. }));
    }

    #[tokio::test]
    async fn test_missing_file_reports_and_cancels() {
        let dir = TempDir::new().unwrap();
        let store = CsvStorage::new(dir.path().join("absent.csv"), 2);
        let cancel = CancellationToken::new();

        let mut failures = 0;
        for mut stream in store.read(&cancel) {
            while let Some(item) = stream.recv().await {
                assert!(matches!(item, Err(PipelineError::Read(_))));
                failures += 1;
            }
        }

        assert_eq!(failures, 1);
        assert!(cancel.is_cancelled());
    }
}

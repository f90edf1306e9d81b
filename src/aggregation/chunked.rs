//! # Chunked Aggregator
//!
//! Pull-based driver that streams a data source in bounded batches and folds
//! every batch into an accumulator:
//!
//! ```text
//! DataSource --fetch(n)--> Batch --aggregate_batch--> Partial --merge--> State --finalize--> Output
//! ```
//!
//! Only one batch and the accumulator are held in memory at a time. A source
//! failure aborts the run: the accumulator is dropped and nothing is
//! returned for it. The source is released on every exit path.

use super::row::Batch;
use crate::config::AggregationConfig;
use crate::error::{AggregationError, SourceError};
use crate::logging::log_batch_operation;
use crate::source::DataSource;
use std::num::NonZeroUsize;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of rows per fetch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// A computation expressed as partial aggregation per batch plus a merge.
///
/// `merge` must be commutative and associative over partials so the output
/// does not depend on how the stream was chunked.
pub trait BatchFold {
    type Partial;
    type State: Default;
    type Output;

    fn aggregate_batch(&self, batch: &Batch) -> Result<Self::Partial, AggregationError>;

    fn merge(&self, state: &mut Self::State, partial: Self::Partial);

    fn finalize(&self, state: Self::State) -> Self::Output;
}

/// Reads a source in batches of at most `batch_size` rows.
///
/// Returns an empty batch exactly once, at end of stream; reading past it
/// fails with [`SourceError::Exhausted`].
pub struct BatchReader<S> {
    source: S,
    batch_size: NonZeroUsize,
    exhausted: bool,
    fetch_calls: usize,
}

impl<S: DataSource> BatchReader<S> {
    pub fn new(source: S, batch_size: NonZeroUsize) -> Self {
        Self {
            source,
            batch_size,
            exhausted: false,
            fetch_calls: 0,
        }
    }

    pub async fn next_batch(&mut self) -> Result<Batch, SourceError> {
        if self.exhausted {
            return Err(SourceError::Exhausted);
        }

        let requested = self.batch_size.get();
        self.fetch_calls += 1;
        let rows = self.source.fetch(requested).await?;

        if rows.len() > requested {
            return Err(SourceError::Overfetch {
                requested,
                returned: rows.len(),
            });
        }
        if rows.is_empty() {
            self.exhausted = true;
        }
        Ok(Batch::new(rows))
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls
    }

    pub async fn release(&mut self) -> Result<(), SourceError> {
        self.source.release().await
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

/// Counters of one aggregation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Calls to `next_batch`, including the final empty one
    pub fetch_calls: usize,
    /// Non-empty batches processed
    pub batches: usize,
    pub rows: u64,
}

/// Output of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationOutcome<T> {
    pub run_id: Uuid,
    pub result: T,
    pub stats: RunStats,
}

/// Drives a [`BatchFold`] over a [`DataSource`] in fixed-size batches.
#[derive(Debug, Clone, Copy)]
pub struct ChunkedAggregator {
    batch_size: NonZeroUsize,
}

impl Default for ChunkedAggregator {
    fn default() -> Self {
        Self {
            batch_size: NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl ChunkedAggregator {
    pub fn new(batch_size: usize) -> Result<Self, AggregationError> {
        NonZeroUsize::new(batch_size)
            .map(|batch_size| Self { batch_size })
            .ok_or(AggregationError::InvalidBatchSize(batch_size))
    }

    pub fn from_config(config: &AggregationConfig) -> Result<Self, AggregationError> {
        Self::new(config.batch_size)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    /// Stream `source` to exhaustion through `fold`.
    ///
    /// The source is owned by the run and released before returning, on the
    /// error path as well. When both the run and the release fail, the run's
    /// error is returned.
    pub async fn run<S, F>(
        &self,
        source: S,
        fold: &F,
    ) -> Result<AggregationOutcome<F::Output>, AggregationError>
    where
        S: DataSource,
        F: BatchFold,
    {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut reader = BatchReader::new(source, self.batch_size);

        debug!(
            run_id = %run_id,
            batch_size = self.batch_size.get(),
            "Starting chunked aggregation"
        );

        let folded = Self::drain(&mut reader, fold, run_id).await;
        let released = reader.release().await;

        match (folded, released) {
            (Ok((state, stats)), Ok(())) => {
                let result = fold.finalize(state);
                info!(
                    run_id = %run_id,
                    batches = stats.batches,
                    rows = stats.rows,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Chunked aggregation completed"
                );
                Ok(AggregationOutcome {
                    run_id,
                    result,
                    stats,
                })
            }
            (Ok(_), Err(release_error)) => {
                warn!(run_id = %run_id, error = %release_error, "Source release failed");
                Err(release_error.into())
            }
            (Err(error), release) => {
                if let Err(release_error) = release {
                    warn!(
                        run_id = %run_id,
                        error = %release_error,
                        "Source release failed after aborted run"
                    );
                }
                crate::logging::log_error(
                    "chunked_aggregator",
                    "run",
                    &error.to_string(),
                    Some(&format!("run_id={run_id}")),
                );
                Err(error)
            }
        }
    }

    async fn drain<S, F>(
        reader: &mut BatchReader<S>,
        fold: &F,
        run_id: Uuid,
    ) -> Result<(F::State, RunStats), AggregationError>
    where
        S: DataSource,
        F: BatchFold,
    {
        let mut state = F::State::default();
        let mut stats = RunStats::default();

        loop {
            let batch = reader.next_batch().await?;
            stats.fetch_calls = reader.fetch_calls();
            if batch.is_empty() {
                break;
            }

            let partial = fold.aggregate_batch(&batch)?;
            fold.merge(&mut state, partial);

            stats.batches += 1;
            stats.rows += batch.len() as u64;
            log_batch_operation(run_id, stats.batches, batch.len(), stats.rows);
        }

        Ok((state, stats))
    }
}

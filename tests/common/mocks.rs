use async_trait::async_trait;
use hospital_analytics::aggregation::{Batch, BatchFold, Row};
use hospital_analytics::error::{AggregationError, SinkError, SourceError};
use hospital_analytics::sink::{MemorySink, ResultSink, ResultTable};
use hospital_analytics::source::{
    DataSource, MemorySource, MemorySourceFactory, SourceFactory, SourceQuery,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps a source and fails a chosen fetch, like a dropped connection
#[derive(Debug)]
pub struct FailingSource {
    inner: MemorySource,
    fail_on_fetch: usize,
    fetches: usize,
    fail_release: bool,
    released: Arc<AtomicBool>,
}

impl FailingSource {
    /// Fails the `fail_on_fetch`-th fetch (1-based)
    pub fn new(inner: MemorySource, fail_on_fetch: usize) -> Self {
        Self {
            inner,
            fail_on_fetch,
            fetches: 0,
            fail_release: false,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Never fails a fetch, only the release
    pub fn failing_release(inner: MemorySource) -> Self {
        Self::new(inner, usize::MAX).with_failing_release()
    }

    pub fn with_failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    /// Flag set once `release` was called, whatever its outcome
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

#[async_trait]
impl DataSource for FailingSource {
    async fn fetch(&mut self, limit: usize) -> Result<Vec<Row>, SourceError> {
        self.fetches += 1;
        if self.fetches == self.fail_on_fetch {
            return Err(SourceError::fetch("connection reset by peer"));
        }
        self.inner.fetch(limit).await
    }

    async fn release(&mut self) -> Result<(), SourceError> {
        self.released.store(true, Ordering::SeqCst);
        self.inner.release().await?;
        if self.fail_release {
            return Err(SourceError::release("cursor already closed"));
        }
        Ok(())
    }
}

/// Returns more rows than asked for
#[derive(Debug, Default)]
pub struct OverfetchingSource {
    pub released: bool,
}

#[async_trait]
impl DataSource for OverfetchingSource {
    async fn fetch(&mut self, limit: usize) -> Result<Vec<Row>, SourceError> {
        let mut source = MemorySource::new(
            vec!["Department".to_string(), "AmountPaid".to_string()],
            (0..=limit)
                .map(|_| vec!["A".into(), 1i64.into()])
                .collect(),
        );
        source.fetch(limit + 1).await
    }

    async fn release(&mut self) -> Result<(), SourceError> {
        self.released = true;
        Ok(())
    }
}

/// Memory factory whose `fail_on_open`-th source fails a fetch, the first
/// one unless set with [`FlakyFactory::failing_fetch`]
#[derive(Debug, Clone)]
pub struct FlakyFactory {
    inner: MemorySourceFactory,
    fail_on_open: usize,
    fail_on_fetch: usize,
    opens: Arc<AtomicUsize>,
}

impl FlakyFactory {
    pub fn new(inner: MemorySourceFactory, fail_on_open: usize) -> Self {
        Self {
            inner,
            fail_on_open,
            fail_on_fetch: 1,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fetch (1-based) that fails on the flaky source
    pub fn failing_fetch(mut self, fetch: usize) -> Self {
        self.fail_on_fetch = fetch;
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFactory for FlakyFactory {
    type Source = FailingSource;

    async fn open(&self, query: &SourceQuery) -> Result<FailingSource, SourceError> {
        let opened = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        let source = self.inner.open(query).await?;
        let fail_on_fetch = if opened == self.fail_on_open {
            self.fail_on_fetch
        } else {
            usize::MAX
        };
        Ok(FailingSource::new(source, fail_on_fetch))
    }
}

/// Memory sink that refuses to write one table
#[derive(Debug, Default)]
pub struct RejectingSink {
    pub inner: MemorySink,
    pub rejected_table: String,
}

impl RejectingSink {
    pub fn new(rejected_table: &str) -> Self {
        Self {
            inner: MemorySink::new(),
            rejected_table: rejected_table.to_string(),
        }
    }
}

#[async_trait]
impl ResultSink for RejectingSink {
    async fn write_table(&mut self, name: &str, table: &ResultTable) -> Result<(), SinkError> {
        if name == self.rejected_table {
            return Err(SinkError::write(name, "permission denied for schema dbo"));
        }
        self.inner.write_table(name, table).await
    }
}

/// Fold recording the length of every batch, in stream order
#[derive(Debug, Default)]
pub struct BatchLengths;

impl BatchFold for BatchLengths {
    type Partial = usize;
    type State = Vec<usize>;
    type Output = Vec<usize>;

    fn aggregate_batch(&self, batch: &Batch) -> Result<usize, AggregationError> {
        Ok(batch.len())
    }

    fn merge(&self, state: &mut Vec<usize>, partial: usize) {
        state.push(partial);
    }

    fn finalize(&self, state: Vec<usize>) -> Vec<usize> {
        state
    }
}

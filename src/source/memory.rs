//! In-memory data source, used for tests, benchmarks and small local datasets.

use super::{DataSource, SourceFactory, SourceQuery};
use crate::aggregation::{Columns, FieldValue, Row};
use crate::error::SourceError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Forward-only stream over rows held in memory
#[derive(Debug, Clone)]
pub struct MemorySource {
    columns: Columns,
    rows: VecDeque<Vec<FieldValue>>,
    fetch_calls: usize,
    released: bool,
}

impl MemorySource {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<FieldValue>>) -> Self {
        Self {
            columns: columns.into(),
            rows: rows.into(),
            fetch_calls: 0,
            released: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// Number of `fetch` calls served so far
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn fetch(&mut self, limit: usize) -> Result<Vec<Row>, SourceError> {
        if self.released {
            return Err(SourceError::Released);
        }
        self.fetch_calls += 1;

        let take = limit.min(self.rows.len());
        let columns = self.columns.clone();
        Ok(self
            .rows
            .drain(..take)
            .map(|values| Row::new(columns.clone(), values))
            .collect())
    }

    async fn release(&mut self) -> Result<(), SourceError> {
        self.released = true;
        self.rows.clear();
        Ok(())
    }
}

/// Opens a [`MemorySource`] over a shared dataset.
///
/// The dataset stands in for the queried table: raw SQL is not interpreted,
/// only the row limit of a table query is applied.
#[derive(Debug, Clone)]
pub struct MemorySourceFactory {
    columns: Vec<String>,
    rows: Arc<Vec<Vec<FieldValue>>>,
    opened: Arc<AtomicUsize>,
}

impl MemorySourceFactory {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<FieldValue>>) -> Self {
        Self {
            columns,
            rows: Arc::new(rows),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of sources opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFactory for MemorySourceFactory {
    type Source = MemorySource;

    async fn open(&self, query: &SourceQuery) -> Result<MemorySource, SourceError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let take = query
            .limit()
            .map_or(self.rows.len(), |limit| (limit as usize).min(self.rows.len()));
        Ok(MemorySource::new(
            self.columns.clone(),
            self.rows[..take].to_vec(),
        ))
    }
}

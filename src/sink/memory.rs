use super::{ResultSink, ResultTable};
use crate::error::SinkError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Keeps written tables in memory, replacing a table written twice
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    tables: HashMap<String, ResultTable>,
    writes: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&ResultTable> {
        self.tables.get(name)
    }

    /// Names of the tables currently held, sorted
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of `write_table` calls that succeeded
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn write_table(&mut self, name: &str, table: &ResultTable) -> Result<(), SinkError> {
        table.validate(name)?;
        self.tables.insert(name.to_string(), table.clone());
        self.writes += 1;
        Ok(())
    }
}

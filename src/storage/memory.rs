use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::views::ViewPlan;
use super::{Table, TableSink};
use crate::constants::{STOREY_RANGE, TOWN};
use crate::error::{EtlError, Result};

/// In-memory sink for development/testing
#[derive(Debug, Default)]
pub struct InMemorySink {
    tables: BTreeMap<String, Table>,
    views: BTreeSet<String>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn views(&self) -> &BTreeSet<String> {
        &self.views
    }
}

impl TableSink for InMemorySink {
    fn write_table(&mut self, name: &str, table: &Table) -> Result<usize> {
        self.tables.insert(name.to_string(), table.clone());
        debug!("Stored {} rows as {}", table.len(), name);
        Ok(table.len())
    }

    fn create_views(&mut self, cleaned_table: &str) -> Result<Vec<String>> {
        let table = self
            .tables
            .get(cleaned_table)
            .ok_or_else(|| EtlError::Storage(format!("no such table: {}", cleaned_table)))?;

        let plan = ViewPlan::new(
            cleaned_table,
            table.text_column(TOWN),
            table.text_column(STOREY_RANGE),
        );
        let names = plan.view_names();
        self.views.extend(names.iter().cloned());
        Ok(names)
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::{PipelineOutcome, StageReport};

/// One table written to the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub rows: usize,
}

/// Outcome of a complete run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub reference_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub inputs: Vec<String>,
    pub raw_count: usize,
    pub cleaned_count: usize,
    pub failed_count: usize,
    pub stages: Vec<StageReport>,
    pub failed_by_reason: BTreeMap<String, usize>,
    pub tables: Vec<TableSummary>,
    pub views: Vec<String>,
    /// Per-town anomaly report files, when enabled
    pub anomaly_reports: Vec<String>,
}

impl RunSummary {
    pub fn new(reference_date: NaiveDate, inputs: Vec<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            reference_date,
            started_at: Utc::now(),
            finished_at: None,
            inputs,
            raw_count: 0,
            cleaned_count: 0,
            failed_count: 0,
            stages: Vec::new(),
            failed_by_reason: BTreeMap::new(),
            tables: Vec::new(),
            views: Vec::new(),
            anomaly_reports: Vec::new(),
        }
    }

    pub fn record_outcome(&mut self, raw_count: usize, outcome: &PipelineOutcome) {
        self.raw_count = raw_count;
        self.cleaned_count = outcome.cleaned.len();
        self.failed_count = outcome.failed.len();
        self.stages = outcome.reports.clone();
        self.failed_by_reason = outcome
            .failed_counts()
            .into_iter()
            .map(|(reason, count)| (reason.as_str().to_string(), count))
            .collect();
    }

    pub fn record_table(&mut self, name: &str, rows: usize) {
        self.tables.push(TableSummary {
            name: name.to_string(),
            rows,
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Every raw record accounted for as either cleaned or failed
    pub fn is_balanced(&self) -> bool {
        self.cleaned_count + self.failed_count == self.raw_count
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Human-readable stage table for the console
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Run {} (reference {})", self.run_id, self.reference_date);
        let _ = writeln!(
            out,
            "{:<18} {:>10} {:>10} {:>10}",
            "stage", "input", "passed", "rejected"
        );
        for stage in &self.stages {
            let _ = writeln!(
                out,
                "{:<18} {:>10} {:>10} {:>10}",
                stage.stage, stage.input_count, stage.passed_count, stage.rejected_count
            );
        }
        let _ = writeln!(
            out,
            "raw {} -> cleaned {}, failed {}",
            self.raw_count, self.cleaned_count, self.failed_count
        );
        for (reason, count) in &self.failed_by_reason {
            let _ = writeln!(out, "  {:<22} {}", reason, count);
        }
        for table in &self.tables {
            let _ = writeln!(out, "table {:<14} {} rows", table.name, table.rows);
        }
        if !self.views.is_empty() {
            let _ = writeln!(out, "{} views created", self.views.len());
        }
        if !self.anomaly_reports.is_empty() {
            let _ = writeln!(out, "{} town anomaly reports written", self.anomaly_reports.len());
        }
        out
    }
}

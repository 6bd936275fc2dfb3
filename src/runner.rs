//! End-to-end run: ingest, clean, report, persist, derive PII, mask, create views.

use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, info_span, warn};

use crate::config::EtlConfig;
use crate::error::Result;
use crate::ingest;
use crate::metrics::PipelineMetrics;
use crate::pii::{build_pii_keys, Masker};
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::report::{build_town_reports, write_town_reports};
use crate::storage::{Table, TableSink};
use crate::summary::RunSummary;
use crate::types::Batch;

pub struct EtlRunner {
    config: EtlConfig,
    reference: NaiveDate,
}

impl EtlRunner {
    pub fn new(config: EtlConfig, reference: NaiveDate) -> Self {
        Self { config, reference }
    }

    fn ingest(&self, inputs: &[PathBuf], summary: &mut RunSummary) -> Result<Batch> {
        let raw = ingest::load_all(inputs)?;
        PipelineMetrics::record_ingested(inputs.len(), raw.len());
        info!("📥 Loaded {} raw records from {} files", raw.len(), inputs.len());
        summary.raw_count = raw.len();
        Ok(raw)
    }

    fn clean(&self, raw: Batch, summary: &mut RunSummary) -> PipelineOutcome {
        let raw_count = raw.len();
        let outcome = Pipeline::new(self.config.clone()).run(raw, self.reference);
        summary.record_outcome(raw_count, &outcome);
        if !summary.is_balanced() {
            warn!(
                "Record accounting mismatch: {} raw, {} cleaned, {} failed",
                summary.raw_count, summary.cleaned_count, summary.failed_count
            );
        }
        outcome
    }

    fn report(&self, outcome: &PipelineOutcome, summary: &mut RunSummary) -> Result<()> {
        let report = &self.config.report;
        if !report.anomaly_report {
            return Ok(());
        }
        let reports = build_town_reports(&outcome.deduplicated, &outcome.failed, self.config.anomaly.iqr_multiplier);
        let paths = write_town_reports(&report.output_dir, &reports)?;
        summary.anomaly_reports = display_paths(&paths);
        Ok(())
    }

    /// Run the cleaning stages only; nothing is persisted to the store
    pub fn check(&self, inputs: &[PathBuf]) -> Result<RunSummary> {
        let mut summary = RunSummary::new(self.reference, display_paths(inputs));
        let raw = self.ingest(inputs, &mut summary)?;
        let outcome = self.clean(raw, &mut summary);
        self.report(&outcome, &mut summary)?;
        summary.finish();
        Ok(summary)
    }

    /// Full run into `sink`
    pub fn run(&self, inputs: &[PathBuf], sink: &mut dyn TableSink, masker: &Masker) -> Result<RunSummary> {
        let mut summary = RunSummary::new(self.reference, display_paths(inputs));
        let span = info_span!("etl_run", run_id = %summary.run_id);
        let _enter = span.enter();
        info!("🚀 Starting ETL run over {} inputs", inputs.len());

        let raw = self.ingest(inputs, &mut summary)?;
        let raw_table = Table::from_raw(&raw);
        let outcome = self.clean(raw, &mut summary);
        self.report(&outcome, &mut summary)?;

        let storage = &self.config.storage;
        persist(sink, &storage.raw_table, &raw_table, &mut summary)?;
        persist(sink, &storage.cleaned_table, &Table::from_batch(&outcome.cleaned), &mut summary)?;
        persist(sink, &storage.failed_table, &Table::from_failed(&outcome.failed), &mut summary)?;

        info!("🔑 Deriving PII keys");
        let keyed = build_pii_keys(&outcome.cleaned);
        persist(sink, &storage.transformed_table, &Table::from_keyed(&keyed), &mut summary)?;

        let masked = masker.mask_all(&keyed);
        persist(sink, &storage.masked_table, &Table::from_masked(&masked), &mut summary)?;

        if storage.create_views {
            let views = sink.create_views(&storage.cleaned_table)?;
            PipelineMetrics::record_views_created(views.len());
            summary.views = views;
        }

        summary.finish();
        info!(
            "✅ ETL run finished: {} cleaned, {} failed, {} tables, {} views",
            summary.cleaned_count,
            summary.failed_count,
            summary.tables.len(),
            summary.views.len()
        );
        Ok(summary)
    }
}

fn persist(sink: &mut dyn TableSink, name: &str, table: &Table, summary: &mut RunSummary) -> Result<()> {
    let started = Instant::now();
    let rows = sink.write_table(name, table)?;
    PipelineMetrics::record_table_written(rows, started.elapsed().as_secs_f64());
    info!("💾 Wrote {} rows to {}", rows, name);
    summary.record_table(name, rows);
    Ok(())
}

fn display_paths(inputs: &[PathBuf]) -> Vec<String> {
    inputs.iter().map(|p| p.display().to_string()).collect()
}

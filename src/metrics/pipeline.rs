//! Pipeline stage metrics
//!
//! Counts of records passed and rejected at each stage boundary, plus
//! stage and persistence timings.

use crate::metrics::phase_metric;

pub struct PipelineMetrics;

impl PipelineMetrics {
    /// Record the partition produced by one stage
    pub fn record_stage(stage: &'static str, passed: usize, rejected: usize, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "stage", "records_passed"), "stage" => stage)
            .increment(passed as u64);
        ::metrics::counter!(phase_metric!(counter, "stage", "records_rejected"), "stage" => stage)
            .increment(rejected as u64);
        ::metrics::histogram!(phase_metric!(histogram, "stage", "duration_seconds"), "stage" => stage)
            .record(duration_secs);
    }

    /// Record the size of the raw input batch
    pub fn record_ingested(files: usize, records: usize) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "files_read")).increment(files as u64);
        ::metrics::counter!(phase_metric!(counter, "ingest", "records_read")).increment(records as u64);
    }

    /// Record one table written to the store
    pub fn record_table_written(rows: usize, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "load", "tables_written")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "load", "rows_written")).increment(rows as u64);
        ::metrics::histogram!(phase_metric!(histogram, "load", "table_duration_seconds"))
            .record(duration_secs);
    }

    /// Record a view created in the store
    pub fn record_views_created(count: usize) {
        ::metrics::gauge!(phase_metric!(gauge, "load", "views")).set(count as f64);
    }

    /// Pre-register so a snapshot is non-empty even for an empty input
    pub fn register_metrics() {
        use ::metrics::{counter, gauge, histogram};

        let _ = counter!(phase_metric!(counter, "ingest", "files_read"));
        let _ = counter!(phase_metric!(counter, "ingest", "records_read"));
        let _ = counter!(phase_metric!(counter, "load", "tables_written"));
        let _ = counter!(phase_metric!(counter, "load", "rows_written"));
        let _ = histogram!(phase_metric!(histogram, "load", "table_duration_seconds"));
        let _ = gauge!(phase_metric!(gauge, "load", "views"));
    }
}

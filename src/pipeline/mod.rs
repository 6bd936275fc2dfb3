//! Data-quality pipeline: validate, recompute lease, dedupe, screen anomalies.
//!
//! Each stage consumes a batch and returns a new one plus the records it
//! rejected; rejects from every stage accumulate into a single failed set.

pub mod anomaly;
pub mod dedupe;
pub mod lease;
pub mod validate;

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{error, info, info_span};

use crate::config::EtlConfig;
use crate::metrics::PipelineMetrics;
use crate::types::{Batch, FailReason, FailedRecord};

pub use anomaly::{cohort_bounds, AnomalyDetector, CohortBounds, CohortKey};
pub use dedupe::{Deduplicator, IdentityKey};
pub use lease::{format_remaining_lease, remaining_lease_months, LeaseRecomputer};
pub use validate::{parse_year_month, RejectedRecord, ValidationIssue, Validator};

pub const VALIDATE_STAGE: &str = "validate";
pub const LEASE_STAGE: &str = "recompute_lease";
pub const DEDUPE_STAGE: &str = "dedupe";
pub const ANOMALY_STAGE: &str = "anomaly";

/// Common trait for all pipeline stages
pub trait Stage {
    /// Stage name used in logs, metrics and reports
    fn name(&self) -> &'static str;

    /// Classify the whole batch. Every input record must come back in exactly
    /// one of `passed` or `rejected`.
    fn run(&self, batch: Batch) -> StageOutput;
}

/// Result of running one stage
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub passed: Batch,
    pub rejected: Vec<FailedRecord>,
}

/// Counts at one stage boundary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    pub input_count: usize,
    pub passed_count: usize,
    pub rejected_count: usize,
    pub duration_ms: u128,
}

impl StageReport {
    pub fn is_complete_partition(&self) -> bool {
        self.passed_count + self.rejected_count == self.input_count
    }
}

/// Everything a pipeline run produces
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Records that passed every stage
    pub cleaned: Batch,
    /// Rejects from every stage, in stage order
    pub failed: Vec<FailedRecord>,
    /// Deduplicated records before anomaly screening
    pub deduplicated: Batch,
    pub reports: Vec<StageReport>,
}

impl PipelineOutcome {
    pub fn failed_counts(&self) -> BTreeMap<FailReason, usize> {
        let mut counts: BTreeMap<FailReason, usize> = FailReason::all().into_iter().map(|r| (r, 0)).collect();
        for failed in &self.failed {
            *counts.entry(failed.reason).or_insert(0) += 1;
        }
        counts
    }

    pub fn report(&self, stage: &str) -> Option<&StageReport> {
        self.reports.iter().find(|r| r.stage == stage)
    }
}

/// Runs the four stages in order with a fixed configuration
pub struct Pipeline {
    config: EtlConfig,
}

impl Pipeline {
    pub fn new(config: EtlConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Run every stage over `raw`. `reference` fixes the lease computation
    /// and the latest acceptable lease commencement year.
    pub fn run(&self, raw: Batch, reference: NaiveDate) -> PipelineOutcome {
        let span = info_span!("pipeline", reference = %reference, input = raw.len());
        let _enter = span.enter();
        info!("🚀 Starting pipeline over {} records", raw.len());

        let mut failed = Vec::new();
        let mut reports = Vec::new();

        let validator = Validator::new(self.config.validation.clone(), reference);
        let recomputer = LeaseRecomputer::new(&self.config.lease, reference);
        let deduplicator = Deduplicator::new();
        let detector = AnomalyDetector::new(self.config.anomaly.clone());

        let valid = run_stage(&validator, raw, &mut failed, &mut reports);
        let leased = run_stage(&recomputer, valid, &mut failed, &mut reports);
        let deduplicated = run_stage(&deduplicator, leased, &mut failed, &mut reports);
        let mut cleaned = run_stage(&detector, deduplicated.clone(), &mut failed, &mut reports);
        cleaned.label = "cleaned".to_string();

        info!(
            "✅ Pipeline finished: {} cleaned, {} failed",
            cleaned.len(),
            failed.len()
        );

        PipelineOutcome {
            cleaned,
            failed,
            deduplicated,
            reports,
        }
    }
}

fn run_stage(
    stage: &dyn Stage,
    batch: Batch,
    failed: &mut Vec<FailedRecord>,
    reports: &mut Vec<StageReport>,
) -> Batch {
    let span = info_span!("stage", name = stage.name());
    let _enter = span.enter();

    let input_count = batch.len();
    let started = Instant::now();
    let output = stage.run(batch);
    let elapsed = started.elapsed();

    let report = StageReport {
        stage: stage.name(),
        input_count,
        passed_count: output.passed.len(),
        rejected_count: output.rejected.len(),
        duration_ms: elapsed.as_millis(),
    };

    if !report.is_complete_partition() {
        error!(
            "Stage '{}' lost records: {} in, {} passed, {} rejected",
            report.stage, report.input_count, report.passed_count, report.rejected_count
        );
    }
    info!(
        "Stage '{}': {} in, {} passed, {} rejected",
        report.stage, report.input_count, report.passed_count, report.rejected_count
    );
    PipelineMetrics::record_stage(
        report.stage,
        report.passed_count,
        report.rejected_count,
        elapsed.as_secs_f64(),
    );

    reports.push(report);
    failed.extend(output.rejected);
    output.passed
}

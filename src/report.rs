//! Per-town anomaly reports: cohort fences and the flagged price-per-sqm points,
//! one JSON file per town under `anomalies_by_town/`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::pipeline::anomaly::cohort_bounds;
use crate::storage::views::{disambiguate, sanitize_town};
use crate::types::{Batch, FailReason, FailedRecord};

pub const REPORT_SUBDIR: &str = "anomalies_by_town";

/// Fence for one flat type within a town
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortReport {
    pub flat_type: String,
    pub size: usize,
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

/// A record the detector routed to the failed set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyPoint {
    pub flat_type: String,
    pub month: String,
    pub block: String,
    pub street_name: String,
    pub price_per_sqm: Option<f64>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TownAnomalyReport {
    pub town: String,
    pub cohorts: Vec<CohortReport>,
    pub anomalies: Vec<AnomalyPoint>,
}

/// Build one report per town from the batch the detector screened and the
/// failed records it produced. Towns come out in ascending order.
pub fn build_town_reports(screened: &Batch, failed: &[FailedRecord], iqr_multiplier: f64) -> Vec<TownAnomalyReport> {
    let mut towns: BTreeMap<String, TownAnomalyReport> = BTreeMap::new();

    for (key, bounds) in cohort_bounds(screened, iqr_multiplier) {
        towns
            .entry(key.town.clone())
            .or_insert_with(|| empty_report(&key.town))
            .cohorts
            .push(CohortReport {
                flat_type: key.flat_type,
                size: bounds.size,
                q1: bounds.q1,
                q3: bounds.q3,
                lower: bounds.lower,
                upper: bounds.upper,
            });
    }

    for f in failed.iter().filter(|f| f.reason == FailReason::StatisticalOutlier) {
        let record = &f.record;
        towns
            .entry(record.town.clone())
            .or_insert_with(|| empty_report(&record.town))
            .anomalies
            .push(AnomalyPoint {
                flat_type: record.flat_type.clone(),
                month: record.month.clone(),
                block: record.block.clone(),
                street_name: record.street_name.clone(),
                price_per_sqm: record.price_per_sqm(),
                detail: f.detail.clone(),
            });
    }

    towns.into_values().collect()
}

fn empty_report(town: &str) -> TownAnomalyReport {
    TownAnomalyReport {
        town: town.to_string(),
        cohorts: Vec::new(),
        anomalies: Vec::new(),
    }
}

/// Write `<dir>/anomalies_by_town/<TOWN>.json` for every report and return the
/// paths written. Towns that sanitize to the same name get a numeric suffix.
pub fn write_town_reports<P: AsRef<Path>>(dir: P, reports: &[TownAnomalyReport]) -> Result<Vec<PathBuf>> {
    let out_dir = dir.as_ref().join(REPORT_SUBDIR);
    std::fs::create_dir_all(&out_dir)?;

    let stems = disambiguate(reports.iter().map(|r| sanitize_town(&r.town)));
    let mut written = Vec::with_capacity(reports.len());
    for (report, stem) in reports.iter().zip(stems) {
        let path = out_dir.join(format!("{}.json", stem));
        std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
        debug!(town = %report.town, "Wrote anomaly report {}", path.display());
        written.push(path);
    }

    info!("📈 Wrote {} town anomaly reports to {}", written.len(), out_dir.display());
    Ok(written)
}

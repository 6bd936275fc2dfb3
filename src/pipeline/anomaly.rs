use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::AnomalyConfig;
use crate::pipeline::{Stage, StageOutput, ANOMALY_STAGE};
use crate::types::{Batch, FailReason, FailedRecord, ResaleRecord};

/// Grouping key for local price-per-sqm statistics
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CohortKey {
    pub town: String,
    pub flat_type: String,
}

impl CohortKey {
    pub fn of(record: &ResaleRecord) -> Self {
        Self {
            town: record.town.clone(),
            flat_type: record.flat_type.clone(),
        }
    }
}

/// Quartile fence for one cohort
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortBounds {
    pub size: usize,
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl CohortBounds {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Quantile of an ascending-sorted slice, interpolating linearly between
/// the two nearest order statistics
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Group-by step: price-per-sqm quartile fences for every cohort in the batch.
/// Records without a usable price per sqm do not contribute.
pub fn cohort_bounds(batch: &Batch, iqr_multiplier: f64) -> BTreeMap<CohortKey, CohortBounds> {
    let mut values: BTreeMap<CohortKey, Vec<f64>> = BTreeMap::new();
    for record in batch {
        if let Some(ppsqm) = record.price_per_sqm().filter(|v| v.is_finite()) {
            values.entry(CohortKey::of(record)).or_default().push(ppsqm);
        }
    }

    values
        .into_iter()
        .filter_map(|(key, mut v)| {
            v.sort_by(|a, b| a.total_cmp(b));
            let q1 = quantile(&v, 0.25)?;
            let q3 = quantile(&v, 0.75)?;
            let iqr = q3 - q1;
            Some((
                key,
                CohortBounds {
                    size: v.len(),
                    q1,
                    q3,
                    lower: q1 - iqr_multiplier * iqr,
                    upper: q3 + iqr_multiplier * iqr,
                },
            ))
        })
        .collect()
}

/// Flags price-per-sqm outliers against cohort fences and an absolute guard
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    fn within_guard(&self, ppsqm: f64) -> bool {
        ppsqm >= self.config.guard_min && ppsqm <= self.config.guard_max
    }

    /// Why a value is anomalous, or `None` when it is normal.
    ///
    /// Cohorts below `min_cohort_size` are judged by the guard alone.
    pub fn assess(&self, ppsqm: Option<f64>, bounds: Option<&CohortBounds>) -> Option<String> {
        let ppsqm = match ppsqm.filter(|v| v.is_finite()) {
            Some(v) => v,
            None => return Some("price per sqm unavailable".to_string()),
        };

        if !self.within_guard(ppsqm) {
            return Some(format!(
                "price per sqm {:.2} outside guard [{}, {}]",
                ppsqm, self.config.guard_min, self.config.guard_max
            ));
        }

        match bounds {
            Some(b) if b.size < self.config.min_cohort_size => None,
            Some(b) if !b.contains(ppsqm) => Some(format!(
                "price per sqm {:.2} outside cohort bounds [{:.2}, {:.2}]",
                ppsqm, b.lower, b.upper
            )),
            Some(_) => None,
            None => Some("no cohort statistics".to_string()),
        }
    }

    /// Split into (normal, anomalous)
    pub fn partition(&self, batch: Batch) -> (Batch, Vec<FailedRecord>) {
        let bounds = cohort_bounds(&batch, self.config.iqr_multiplier);
        info!("Computed price-per-sqm bounds for {} cohorts", bounds.len());

        let label = batch.label.clone();
        let mut normal = Vec::with_capacity(batch.len());
        let mut anomalies = Vec::new();

        for record in batch {
            let key = CohortKey::of(&record);
            match self.assess(record.price_per_sqm(), bounds.get(&key)) {
                None => normal.push(record),
                Some(detail) => {
                    debug!(town = %key.town, flat_type = %key.flat_type, "Anomaly: {}", detail);
                    anomalies.push(FailedRecord::new(record, FailReason::StatisticalOutlier).with_detail(detail));
                }
            }
        }

        (Batch::new(format!("{}:screened", label), normal), anomalies)
    }
}

impl Stage for AnomalyDetector {
    fn name(&self) -> &'static str {
        ANOMALY_STAGE
    }

    fn run(&self, batch: Batch) -> StageOutput {
        let (passed, rejected) = self.partition(batch);
        StageOutput { passed, rejected }
    }
}

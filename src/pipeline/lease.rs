use chrono::{Datelike, NaiveDate};

use crate::config::LeaseConfig;
use crate::pipeline::{Stage, StageOutput, LEASE_STAGE};
use crate::types::Batch;

/// Months left on a lease that commenced in `commence_year`, measured at `reference`.
///
/// The lease is treated as expiring at the start of `commence_year + term_years`;
/// the result is clamped to `[0, term_years * 12]`.
pub fn remaining_lease_months(commence_year: f64, term_years: i32, reference: NaiveDate) -> Option<u32> {
    if !commence_year.is_finite() {
        return None;
    }
    let expiry_year = commence_year + term_years as f64;
    let years_left = expiry_year - reference.year() as f64;
    let months = years_left * 12.0 - (reference.month() as f64 - 1.0);
    let cap = term_years.max(0) as f64 * 12.0;
    Some(months.clamp(0.0, cap).floor() as u32)
}

/// `"X years Y months"`
pub fn format_remaining_lease(months: u32) -> String {
    format!("{} years {} months", months / 12, months % 12)
}

/// Derives remaining-lease fields from a fixed reference date
pub struct LeaseRecomputer {
    term_years: i32,
    reference: NaiveDate,
}

impl LeaseRecomputer {
    pub fn new(config: &LeaseConfig, reference: NaiveDate) -> Self {
        Self {
            term_years: config.term_years,
            reference,
        }
    }

    /// New batch with `remaining_lease_months` and `remaining_lease` set on every record.
    /// Records without a commencement year get neither.
    pub fn recompute(&self, batch: Batch) -> Batch {
        let label = batch.label.clone();
        let records = batch
            .into_iter()
            .map(|mut record| {
                let months = record
                    .lease_commence_date
                    .and_then(|year| remaining_lease_months(year, self.term_years, self.reference));
                record.remaining_lease_months = months;
                record.remaining_lease = months.map(format_remaining_lease);
                record
            })
            .collect();
        Batch::new(format!("{}:leased", label), records)
    }
}

impl Stage for LeaseRecomputer {
    fn name(&self) -> &'static str {
        LEASE_STAGE
    }

    fn run(&self, batch: Batch) -> StageOutput {
        StageOutput {
            passed: self.recompute(batch),
            rejected: Vec::new(),
        }
    }
}

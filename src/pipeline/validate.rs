use chrono::{Datelike, NaiveDate};
use std::fmt;
use tracing::debug;

use crate::config::ValidationConfig;
use crate::constants;
use crate::pipeline::{Stage, StageOutput, VALIDATE_STAGE};
use crate::types::{Batch, FailReason, FailedRecord, ResaleRecord};

/// A single structural check a record failed
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    /// Month is not `YYYY-MM` or `YYYY-M`
    InvalidMonth(String),
    /// Price missing or not strictly positive
    InvalidPrice(Option<f64>),
    /// Floor area missing or not strictly positive
    InvalidFloorArea(Option<f64>),
    /// Lease commencement year outside the plausible window
    LeaseYearOutOfRange(f64),
    /// Flat type not in the allowed set
    UnknownFlatType(String),
    /// Required text field is empty after whitespace normalization
    EmptyField(&'static str),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::InvalidMonth(m) => write!(f, "invalid month '{}'", m),
            ValidationIssue::InvalidPrice(Some(p)) => write!(f, "non-positive price {}", p),
            ValidationIssue::InvalidPrice(None) => f.write_str("missing price"),
            ValidationIssue::InvalidFloorArea(Some(a)) => write!(f, "non-positive floor area {}", a),
            ValidationIssue::InvalidFloorArea(None) => f.write_str("missing floor area"),
            ValidationIssue::LeaseYearOutOfRange(y) => write!(f, "lease commencement year {} out of range", y),
            ValidationIssue::UnknownFlatType(t) => write!(f, "unknown flat type '{}'", t),
            ValidationIssue::EmptyField(c) => write!(f, "empty {}", c),
        }
    }
}

/// A record that failed validation, with every check it failed
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    pub record: ResaleRecord,
    pub issues: Vec<ValidationIssue>,
}

impl RejectedRecord {
    pub fn into_failed(self) -> FailedRecord {
        let detail = self
            .issues
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        FailedRecord::new(self.record, FailReason::StructuralInvalid).with_detail(detail)
    }
}

/// Parse a `YYYY-MM` or `YYYY-M` month into (year, month)
pub fn parse_year_month(value: &str) -> Option<(i32, u32)> {
    let (year, month) = value.trim().split_once('-')?;
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if month.is_empty() || month.len() > 2 || !month.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1).map(|_| (year, month))
}

/// Structural validator: partitions a batch into valid and rejected records
pub struct Validator {
    rules: ValidationConfig,
    current_year: i32,
}

impl Validator {
    /// `reference` fixes the upper bound of the lease commencement window
    pub fn new(rules: ValidationConfig, reference: NaiveDate) -> Self {
        Self {
            rules,
            current_year: reference.year(),
        }
    }

    /// Every check the record fails; empty means valid
    pub fn check(&self, record: &ResaleRecord) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if parse_year_month(&record.month).is_none() {
            issues.push(ValidationIssue::InvalidMonth(record.month.clone()));
        }

        match record.resale_price {
            Some(p) if p > 0.0 => {}
            other => issues.push(ValidationIssue::InvalidPrice(other)),
        }

        match record.floor_area_sqm {
            Some(a) if a > 0.0 => {}
            other => issues.push(ValidationIssue::InvalidFloorArea(other)),
        }

        if let Some(year) = record.lease_commence_date {
            let min = self.rules.min_lease_commence_year as f64;
            let max = self.current_year as f64;
            if !(min..=max).contains(&year) {
                issues.push(ValidationIssue::LeaseYearOutOfRange(year));
            }
        }

        if !self.rules.allowed_flat_types.iter().any(|t| t == &record.flat_type) {
            issues.push(ValidationIssue::UnknownFlatType(record.flat_type.clone()));
        }

        for column in constants::REQUIRED_TEXT_COLS {
            let blank = record
                .text_field(column)
                .map_or(true, |v| v.split_whitespace().next().is_none());
            if blank {
                issues.push(ValidationIssue::EmptyField(column));
            }
        }

        issues
    }

    /// Split a batch into (valid, rejected); input order is preserved in both
    pub fn partition(&self, batch: Batch) -> (Batch, Vec<RejectedRecord>) {
        let label = batch.label.clone();
        let mut valid = Vec::with_capacity(batch.len());
        let mut rejected = Vec::new();

        for record in batch {
            let issues = self.check(&record);
            if issues.is_empty() {
                valid.push(record);
            } else {
                debug!(
                    town = %record.town,
                    block = %record.block,
                    month = %record.month,
                    "Record failed validation: {:?}",
                    issues
                );
                rejected.push(RejectedRecord { record, issues });
            }
        }

        (Batch::new(format!("{}:valid", label), valid), rejected)
    }
}

impl Stage for Validator {
    fn name(&self) -> &'static str {
        VALIDATE_STAGE
    }

    fn run(&self, batch: Batch) -> StageOutput {
        let (passed, rejected) = self.partition(batch);
        StageOutput {
            passed,
            rejected: rejected.into_iter().map(RejectedRecord::into_failed).collect(),
        }
    }
}

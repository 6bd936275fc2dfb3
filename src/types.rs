use serde::{Deserialize, Serialize};
use std::fmt;

/// One resale transaction in canonical shape.
///
/// Numeric fields are `None` when the source cell was empty or could not be
/// coerced. `remaining_lease_months` is only populated by the lease recomputer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResaleRecord {
    pub month: String,
    pub town: String,
    pub flat_type: String,
    pub block: String,
    pub street_name: String,
    pub storey_range: String,
    pub floor_area_sqm: Option<f64>,
    pub flat_model: String,
    pub lease_commence_date: Option<f64>,
    pub remaining_lease: Option<String>,
    pub resale_price: Option<f64>,
    #[serde(default)]
    pub remaining_lease_months: Option<u32>,
}

impl ResaleRecord {
    /// Price per square metre, when both price and area are usable
    pub fn price_per_sqm(&self) -> Option<f64> {
        match (self.resale_price, self.floor_area_sqm) {
            (Some(price), Some(area)) if area > 0.0 => Some(price / area),
            _ => None,
        }
    }

    /// Text attribute by canonical column name
    pub fn text_field(&self, column: &str) -> Option<&str> {
        use crate::constants::*;
        match column {
            MONTH => Some(&self.month),
            TOWN => Some(&self.town),
            FLAT_TYPE => Some(&self.flat_type),
            BLOCK => Some(&self.block),
            STREET_NAME => Some(&self.street_name),
            STOREY_RANGE => Some(&self.storey_range),
            FLAT_MODEL => Some(&self.flat_model),
            REMAINING_LEASE => self.remaining_lease.as_deref(),
            _ => None,
        }
    }
}

/// An ordered, labeled collection of records sharing the canonical schema
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    pub label: String,
    pub records: Vec<ResaleRecord>,
}

impl Batch {
    pub fn new(label: impl Into<String>, records: Vec<ResaleRecord>) -> Self {
        Self {
            label: label.into(),
            records,
        }
    }

    pub fn empty(label: impl Into<String>) -> Self {
        Self::new(label, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResaleRecord> {
        self.records.iter()
    }

    pub fn push(&mut self, record: ResaleRecord) {
        self.records.push(record);
    }

    pub fn into_records(self) -> Vec<ResaleRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a ResaleRecord;
    type IntoIter = std::slice::Iter<'a, ResaleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for Batch {
    type Item = ResaleRecord;
    type IntoIter = std::vec::IntoIter<ResaleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Why a record left the clean path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailReason {
    /// Failed basic structural validation
    #[serde(rename = "basic_validation")]
    StructuralInvalid,
    /// Lower-priced (or tied) duplicate of a retained record
    #[serde(rename = "duplicate_lower_price")]
    DuplicateSuperseded,
    /// Price per sqm outside cohort or absolute bounds
    #[serde(rename = "anomaly_ppsqm")]
    StatisticalOutlier,
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::StructuralInvalid => "basic_validation",
            FailReason::DuplicateSuperseded => "duplicate_lower_price",
            FailReason::StatisticalOutlier => "anomaly_ppsqm",
        }
    }

    pub fn all() -> [FailReason; 3] {
        [
            FailReason::StructuralInvalid,
            FailReason::DuplicateSuperseded,
            FailReason::StatisticalOutlier,
        ]
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record routed out of the clean path, with exactly one reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub record: ResaleRecord,
    pub reason: FailReason,
    pub detail: Option<String>,
}

impl FailedRecord {
    pub fn new(record: ResaleRecord, reason: FailReason) -> Self {
        Self {
            record,
            reason,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::ResaleRecord;

    /// A record that passes every validation rule
    pub fn record(town: &str, flat_type: &str, price: f64, area: f64) -> ResaleRecord {
        ResaleRecord {
            month: "2015-01".to_string(),
            town: town.to_string(),
            flat_type: flat_type.to_string(),
            block: "174".to_string(),
            street_name: "ANG MO KIO AVE 4".to_string(),
            storey_range: "07 TO 09".to_string(),
            floor_area_sqm: Some(area),
            flat_model: "Improved".to_string(),
            lease_commence_date: Some(1986.0),
            remaining_lease: None,
            resale_price: Some(price),
            remaining_lease_months: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;

    #[test]
    fn test_price_per_sqm() {
        let r = record("ANG MO KIO", "3 ROOM", 300000.0, 60.0);
        assert_eq!(r.price_per_sqm(), Some(5000.0));

        let mut missing = r.clone();
        missing.floor_area_sqm = None;
        assert_eq!(missing.price_per_sqm(), None);
    }

    #[test]
    fn test_fail_reason_tags() {
        assert_eq!(FailReason::StructuralInvalid.to_string(), "basic_validation");
        assert_eq!(FailReason::DuplicateSuperseded.as_str(), "duplicate_lower_price");
        assert_eq!(
            serde_json::to_string(&FailReason::StatisticalOutlier).unwrap(),
            "\"anomaly_ppsqm\""
        );
    }
}

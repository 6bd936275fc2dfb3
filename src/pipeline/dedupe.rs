use std::collections::HashMap;
use tracing::debug;

use crate::pipeline::{Stage, StageOutput, DEDUPE_STAGE};
use crate::types::{Batch, FailReason, FailedRecord, ResaleRecord};

/// Every record attribute except price.
///
/// Two records with equal keys describe the same unit and transaction month
/// reported at different prices. Floats are compared by bit pattern with
/// `-0.0` folded onto `0.0`; absent values are equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    month: String,
    town: String,
    flat_type: String,
    block: String,
    street_name: String,
    storey_range: String,
    floor_area_sqm: Option<u64>,
    flat_model: String,
    lease_commence_date: Option<u64>,
    remaining_lease: Option<String>,
    remaining_lease_months: Option<u32>,
}

fn float_key(value: Option<f64>) -> Option<u64> {
    value.map(|v| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() })
}

impl IdentityKey {
    pub fn of(record: &ResaleRecord) -> Self {
        Self {
            month: record.month.clone(),
            town: record.town.clone(),
            flat_type: record.flat_type.clone(),
            block: record.block.clone(),
            street_name: record.street_name.clone(),
            storey_range: record.storey_range.clone(),
            floor_area_sqm: float_key(record.floor_area_sqm),
            flat_model: record.flat_model.clone(),
            lease_commence_date: float_key(record.lease_commence_date),
            remaining_lease: record.remaining_lease.clone(),
            remaining_lease_months: record.remaining_lease_months,
        }
    }
}

/// Collapses records sharing an [`IdentityKey`] to the highest-priced one.
///
/// When several group members share the maximum price, the first one in
/// input order is kept and the rest are dropped alongside the lower prices.
/// Kept records come out in the order their group first appeared.
#[derive(Debug, Default)]
pub struct Deduplicator;

impl Deduplicator {
    pub fn new() -> Self {
        Self
    }

    /// Split into (deduplicated, dropped duplicates)
    pub fn dedupe(&self, batch: Batch) -> (Batch, Vec<FailedRecord>) {
        let label = batch.label.clone();
        let records = batch.into_records();

        // Group member indices by key, groups in first-appearance order
        let mut index: HashMap<IdentityKey, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let group = *index.entry(IdentityKey::of(record)).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[group].push(i);
        }

        let price = |i: usize| records[i].resale_price.unwrap_or(f64::NEG_INFINITY);

        let mut representative_of = vec![0usize; records.len()];
        let mut representatives = Vec::with_capacity(groups.len());
        for members in &groups {
            let mut best = members[0];
            for &i in &members[1..] {
                if price(i) > price(best) {
                    best = i;
                }
            }
            for &i in members {
                representative_of[i] = best;
            }
            representatives.push(best);
        }

        let kept_prices: Vec<Option<f64>> = representative_of.iter().map(|&r| records[r].resale_price).collect();
        let mut slots: Vec<Option<ResaleRecord>> = records.into_iter().map(Some).collect();

        let kept: Vec<ResaleRecord> = representatives
            .iter()
            .filter_map(|&i| slots[i].take())
            .collect();

        let dropped: Vec<FailedRecord> = slots
            .into_iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|record| (i, record)))
            .map(|(i, record)| {
                let detail = match (record.resale_price, kept_prices[i]) {
                    (Some(own), Some(max)) if own == max => format!("tied at maximum price {}", max),
                    (_, Some(max)) => format!("superseded by price {}", max),
                    _ => "superseded by duplicate without price".to_string(),
                };
                debug!(
                    town = %record.town,
                    block = %record.block,
                    month = %record.month,
                    "Dropping duplicate: {}",
                    detail
                );
                FailedRecord::new(record, FailReason::DuplicateSuperseded).with_detail(detail)
            })
            .collect();

        (Batch::new(format!("{}:deduped", label), kept), dropped)
    }
}

impl Stage for Deduplicator {
    fn name(&self) -> &'static str {
        DEDUPE_STAGE
    }

    fn run(&self, batch: Batch) -> StageOutput {
        let (passed, rejected) = self.dedupe(batch);
        StageOutput { passed, rejected }
    }
}

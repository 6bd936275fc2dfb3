//! CSV ingestion into the canonical record shape.
//!
//! Formatting only: whitespace is normalized and numbers coerced, but no
//! values are imputed. Cells that cannot be coerced become `None` and are
//! left for the validator to reject.

use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{error, info};

use crate::constants::*;
use crate::error::{EtlError, Result};
use crate::types::{Batch, ResaleRecord};

/// Trim and collapse internal runs of whitespace to a single space
pub fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Coerce a numeric cell; empty or unparseable cells are absent
pub fn coerce_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Coerce a price cell, dropping thousands separators first
pub fn coerce_price(value: &str) -> Option<f64> {
    coerce_number(&value.replace(',', ""))
}

/// Column positions in one source file
struct ColumnIndex {
    positions: HashMap<&'static str, usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord, source: &str) -> Result<Self> {
        let lookup: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim(), i))
            .collect();

        let mut positions = HashMap::new();
        for column in CANON_COLS {
            match lookup.get(column) {
                Some(&i) => {
                    positions.insert(column, i);
                }
                None if OPTIONAL_COLS.contains(&column) => {}
                None => {
                    error!("Source '{}' has no '{}' column", source, column);
                    return Err(EtlError::MissingField(format!("{} (in {})", column, source)));
                }
            }
        }
        Ok(Self { positions })
    }

    fn cell<'r>(&self, row: &'r StringRecord, column: &str) -> &'r str {
        self.positions
            .get(column)
            .and_then(|&i| row.get(i))
            .unwrap_or("")
    }

    fn text(&self, row: &StringRecord, column: &str) -> String {
        normalize_whitespace(self.cell(row, column))
    }
}

/// Read canonical records from any CSV reader. `source` names the input in errors.
pub fn read_records<R: Read>(reader: R, source: &str) -> Result<Vec<ResaleRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(reader);

    let columns = ColumnIndex::from_headers(rdr.headers()?, source)?;

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let remaining_lease = columns.text(&row, REMAINING_LEASE);
        records.push(ResaleRecord {
            month: columns.cell(&row, MONTH).trim().to_string(),
            town: columns.text(&row, TOWN),
            flat_type: columns.text(&row, FLAT_TYPE),
            block: columns.text(&row, BLOCK),
            street_name: columns.text(&row, STREET_NAME),
            storey_range: columns.text(&row, STOREY_RANGE),
            floor_area_sqm: coerce_number(columns.cell(&row, FLOOR_AREA_SQM)),
            flat_model: columns.text(&row, FLAT_MODEL),
            lease_commence_date: coerce_number(columns.cell(&row, LEASE_COMMENCE_DATE)),
            remaining_lease: (!remaining_lease.is_empty()).then_some(remaining_lease),
            resale_price: coerce_price(columns.cell(&row, RESALE_PRICE)),
            remaining_lease_months: None,
        });
    }
    Ok(records)
}

/// Read one CSV file into canonical records
pub fn read_and_canonize<P: AsRef<Path>>(path: P) -> Result<Vec<ResaleRecord>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let records = read_records(file, &path.display().to_string())?;
    info!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Concatenate every file, in order, into the raw batch
pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Batch> {
    let mut raw = Batch::empty("raw");
    for path in paths {
        raw.records.extend(read_and_canonize(path)?);
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "month,town,flat_type,block,street_name,storey_range,floor_area_sqm,flat_model,lease_commence_date,remaining_lease,resale_price";

    #[test]
    fn test_reads_and_normalizes() {
        let csv = format!(
            "{}\n2015-01, ANG  MO KIO ,3 ROOM,174,ANG MO KIO   AVE 4,07 TO 09,60,Improved,1986,70 years 2 months,\"255,000\"\n",
            HEADER
        );
        let records = read_records(csv.as_bytes(), "inline").unwrap();
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.town, "ANG MO KIO");
        assert_eq!(r.street_name, "ANG MO KIO AVE 4");
        assert_eq!(r.floor_area_sqm, Some(60.0));
        assert_eq!(r.lease_commence_date, Some(1986.0));
        assert_eq!(r.resale_price, Some(255000.0));
        assert_eq!(r.remaining_lease.as_deref(), Some("70 years 2 months"));
    }

    #[test]
    fn test_remaining_lease_column_is_optional() {
        let csv = "month,town,flat_type,block,street_name,storey_range,floor_area_sqm,flat_model,lease_commence_date,resale_price\n\
                   2012-03,BEDOK,4 ROOM,10,BEDOK NTH RD,01 TO 03,92,New Generation,1978,380000\n";
        let records = read_records(csv.as_bytes(), "inline").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].remaining_lease, None);
    }

    #[test]
    fn test_columns_may_be_reordered_and_extra() {
        let csv = "resale_price,extra,month,town,flat_type,block,street_name,storey_range,floor_area_sqm,flat_model,lease_commence_date\n\
                   400000,x,2016-5,YISHUN,5 ROOM,801,YISHUN RING RD,10 TO 12,120,Improved,1988\n";
        let records = read_records(csv.as_bytes(), "inline").unwrap();
        assert_eq!(records[0].month, "2016-5");
        assert_eq!(records[0].resale_price, Some(400000.0));
    }

    #[test]
    fn test_missing_required_column_is_fatal() {
        let csv = "month,town,flat_type,block,street_name,storey_range,floor_area_sqm,flat_model,lease_commence_date\n";
        let err = read_records(csv.as_bytes(), "inline").unwrap_err();
        match err {
            EtlError::MissingField(field) => assert!(field.starts_with("resale_price")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_numbers_become_absent() {
        let csv = format!("{}\n2015-01,BEDOK,4 ROOM,1,RD,01 TO 03,n/a,Model A,,,\n", HEADER);
        let records = read_records(csv.as_bytes(), "inline").unwrap();
        assert_eq!(records[0].floor_area_sqm, None);
        assert_eq!(records[0].lease_commence_date, None);
        assert_eq!(records[0].resale_price, None);
    }
}

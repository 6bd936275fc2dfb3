//! Tabular persistence of pipeline outputs.
//!
//! Records are flattened into a [`Table`] before they reach a sink. Absent
//! values are replaced with the `-1` sentinel at that point, so sinks never
//! see nulls.

pub mod memory;
pub mod sqlite;
pub mod views;

pub use memory::InMemorySink;
pub use sqlite::SqliteSink;
pub use views::{parse_storey_range, town_view_name, ViewPlan};

use crate::constants::*;
use crate::error::Result;
use crate::pii::{KeyedRecord, MaskedRecord};
use crate::types::{Batch, FailedRecord, ResaleRecord};

pub const NUMERIC_SENTINEL: f64 = -1.0;
pub const INTEGER_SENTINEL: i64 = -1;
pub const TEXT_SENTINEL: &str = "-1";

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Real => "DOUBLE",
            ColumnType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    fn real(v: Option<f64>) -> Self {
        Value::Real(v.filter(|x| x.is_finite()).unwrap_or(NUMERIC_SENTINEL))
    }

    fn integer(v: Option<i64>) -> Self {
        Value::Integer(v.unwrap_or(INTEGER_SENTINEL))
    }

    fn text(v: &str) -> Self {
        if v.is_empty() {
            Value::Text(TEXT_SENTINEL.to_string())
        } else {
            Value::Text(v.to_string())
        }
    }

    fn opt_text(v: Option<&str>) -> Self {
        Value::text(v.unwrap_or(""))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

impl Column {
    pub fn new(name: &str, kind: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Column-typed rows ready to be written
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

fn canonical_columns() -> Vec<Column> {
    CANON_COLS
        .iter()
        .map(|&name| {
            let kind = match name {
                FLOOR_AREA_SQM | LEASE_COMMENCE_DATE | RESALE_PRICE => ColumnType::Real,
                _ => ColumnType::Text,
            };
            Column::new(name, kind)
        })
        .collect()
}

fn canonical_values(r: &ResaleRecord) -> Vec<Value> {
    vec![
        Value::text(&r.month),
        Value::text(&r.town),
        Value::text(&r.flat_type),
        Value::text(&r.block),
        Value::text(&r.street_name),
        Value::text(&r.storey_range),
        Value::real(r.floor_area_sqm),
        Value::text(&r.flat_model),
        Value::real(r.lease_commence_date),
        Value::opt_text(r.remaining_lease.as_deref()),
        Value::real(r.resale_price),
    ]
}

fn record_columns() -> Vec<Column> {
    let mut columns = canonical_columns();
    columns.push(Column::new(REMAINING_LEASE_MONTHS, ColumnType::Integer));
    columns
}

fn record_values(r: &ResaleRecord) -> Vec<Value> {
    let mut values = canonical_values(r);
    values.push(Value::integer(r.remaining_lease_months.map(i64::from)));
    values
}

impl Table {
    /// Source records as read: canonical columns only
    pub fn from_raw(batch: &Batch) -> Self {
        Self {
            columns: canonical_columns(),
            rows: batch.iter().map(canonical_values).collect(),
        }
    }

    /// Processed records, including the recomputed lease months
    pub fn from_batch(batch: &Batch) -> Self {
        Self {
            columns: record_columns(),
            rows: batch.iter().map(record_values).collect(),
        }
    }

    pub fn from_failed(failed: &[FailedRecord]) -> Self {
        let mut columns = record_columns();
        columns.push(Column::new(FAIL_REASON, ColumnType::Text));
        columns.push(Column::new(FAIL_DETAIL, ColumnType::Text));

        let rows = failed
            .iter()
            .map(|f| {
                let mut values = record_values(&f.record);
                values.push(Value::text(f.reason.as_str()));
                values.push(Value::opt_text(f.detail.as_deref()));
                values
            })
            .collect();
        Self { columns, rows }
    }

    pub fn from_keyed(keyed: &[KeyedRecord]) -> Self {
        let mut columns = record_columns();
        columns.push(Column::new(PII_KEY, ColumnType::Text));

        let rows = keyed
            .iter()
            .map(|k| {
                let mut values = record_values(&k.record);
                values.push(Value::text(&k.pii_key));
                values
            })
            .collect();
        Self { columns, rows }
    }

    pub fn from_masked(masked: &[MaskedRecord]) -> Self {
        let mut columns = record_columns();
        columns.push(Column::new(PII_MASKED, ColumnType::Text));

        let rows = masked
            .iter()
            .map(|m| {
                let mut values = record_values(&m.record);
                values.push(Value::text(&m.pii_masked));
                values
            })
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Every text value in one column, in row order
    pub fn text_column(&self, name: &str) -> Vec<&str> {
        match self.column_index(name) {
            Some(i) => self.rows.iter().filter_map(|row| row[i].as_text()).collect(),
            None => Vec::new(),
        }
    }
}

/// Destination for pipeline tables
pub trait TableSink {
    /// Replace `name` with the contents of `table`. Returns the row count written.
    fn write_table(&mut self, name: &str, table: &Table) -> Result<usize>;

    /// Create the storey helper view and the per-town and per-floor views
    /// over the cleaned table. Returns the names of the views created.
    fn create_views(&mut self, cleaned_table: &str) -> Result<Vec<String>>;
}

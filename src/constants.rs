/// Canonical column names, in the order every table is written
pub const MONTH: &str = "month";
pub const TOWN: &str = "town";
pub const FLAT_TYPE: &str = "flat_type";
pub const BLOCK: &str = "block";
pub const STREET_NAME: &str = "street_name";
pub const STOREY_RANGE: &str = "storey_range";
pub const FLOOR_AREA_SQM: &str = "floor_area_sqm";
pub const FLAT_MODEL: &str = "flat_model";
pub const LEASE_COMMENCE_DATE: &str = "lease_commence_date";
pub const REMAINING_LEASE: &str = "remaining_lease";
pub const RESALE_PRICE: &str = "resale_price";

// Derived columns
pub const REMAINING_LEASE_MONTHS: &str = "remaining_lease_months";
pub const FAIL_REASON: &str = "fail_reason";
pub const FAIL_DETAIL: &str = "fail_detail";
pub const PII_KEY: &str = "PII_Key";
pub const PII_MASKED: &str = "PII_Masked";

pub const CANON_COLS: [&str; 11] = [
    MONTH,
    TOWN,
    FLAT_TYPE,
    BLOCK,
    STREET_NAME,
    STOREY_RANGE,
    FLOOR_AREA_SQM,
    FLAT_MODEL,
    LEASE_COMMENCE_DATE,
    REMAINING_LEASE,
    RESALE_PRICE,
];

/// Columns that may be absent from a source file. Older extracts predate
/// the remaining-lease column; it is recomputed anyway.
pub const OPTIONAL_COLS: [&str; 1] = [REMAINING_LEASE];

/// Text columns that must be non-empty for a record to be structurally valid
pub const REQUIRED_TEXT_COLS: [&str; 6] = [TOWN, FLAT_TYPE, FLAT_MODEL, BLOCK, STREET_NAME, STOREY_RANGE];

/// Flat types accepted by the validator unless overridden in config
pub const DEFAULT_FLAT_TYPES: [&str; 7] = [
    "1 ROOM",
    "2 ROOM",
    "3 ROOM",
    "4 ROOM",
    "5 ROOM",
    "EXECUTIVE",
    "MULTI-GENERATION",
];

pub const MIN_LEASE_COMMENCE_YEAR: i32 = 1960;
pub const LEASE_TERM_YEARS: i32 = 99;
pub const MAX_LEASE_TERM_YEARS: i32 = 999;

pub const IQR_MULTIPLIER: f64 = 1.5;
pub const PPSQM_GUARD_MIN: f64 = 500.0;
pub const PPSQM_GUARD_MAX: f64 = 30000.0;

// Default table names in the store
pub const RAW_TABLE: &str = "Raw";
pub const CLEANED_TABLE: &str = "Cleaned";
pub const FAILED_TABLE: &str = "Failed";
pub const TRANSFORMED_TABLE: &str = "Transformed";
pub const MASKED_TABLE: &str = "Masked";

pub const PII_SALT_ENV: &str = "PII_SALT";
pub const PII_DIGEST_LEN: usize = 24;

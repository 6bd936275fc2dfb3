use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::constants;
use crate::error::{EtlError, Result};

/// Settings threaded into every pipeline stage and the persistence layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub validation: ValidationConfig,
    pub lease: LeaseConfig,
    pub anomaly: AnomalyConfig,
    pub storage: StorageConfig,
    pub pii: PiiConfig,
    pub report: ReportConfig,
}

/// Rules for the structural validator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Accepted flat types (exact, case-sensitive match)
    pub allowed_flat_types: Vec<String>,
    /// Earliest plausible lease commencement year
    pub min_lease_commence_year: i32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            allowed_flat_types: constants::DEFAULT_FLAT_TYPES.iter().map(|s| s.to_string()).collect(),
            min_lease_commence_year: constants::MIN_LEASE_COMMENCE_YEAR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    pub term_years: i32,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            term_years: constants::LEASE_TERM_YEARS,
        }
    }
}

/// Bounds for the cohort anomaly detector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Multiplier applied to the IQR on each side of the quartiles
    pub iqr_multiplier: f64,
    /// Absolute price-per-sqm floor, applied to every cohort
    pub guard_min: f64,
    /// Absolute price-per-sqm ceiling, applied to every cohort
    pub guard_max: f64,
    /// Cohorts smaller than this skip the IQR test and rely on the guard alone
    pub min_cohort_size: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            iqr_multiplier: constants::IQR_MULTIPLIER,
            guard_min: constants::PPSQM_GUARD_MIN,
            guard_max: constants::PPSQM_GUARD_MAX,
            min_cohort_size: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
    pub raw_table: String,
    pub cleaned_table: String,
    pub failed_table: String,
    pub transformed_table: String,
    pub masked_table: String,
    /// Build town and floor views over the cleaned table after loading
    pub create_views: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "output/hdb_resale.db".to_string(),
            raw_table: constants::RAW_TABLE.to_string(),
            cleaned_table: constants::CLEANED_TABLE.to_string(),
            failed_table: constants::FAILED_TABLE.to_string(),
            transformed_table: constants::TRANSFORMED_TABLE.to_string(),
            masked_table: constants::MASKED_TABLE.to_string(),
            create_views: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PiiConfig {
    /// Environment variable holding the masking salt
    pub salt_env: String,
    /// Number of hex characters kept from the digest
    pub digest_len: usize,
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            salt_env: constants::PII_SALT_ENV.to_string(),
            digest_len: constants::PII_DIGEST_LEN,
        }
    }
}

/// Per-town anomaly reports written next to the database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub anomaly_report: bool,
    /// Reports land in `<output_dir>/anomalies_by_town/`
    pub output_dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            anomaly_report: false,
            output_dir: "output".to_string(),
        }
    }
}

impl PiiConfig {
    /// Read the masking salt from the environment
    pub fn salt(&self) -> Result<String> {
        std::env::var(&self.salt_env)
            .map_err(|_| EtlError::Config(format!("environment variable '{}' is not set", self.salt_env)))
    }
}

impl EtlConfig {
    /// Load configuration from a TOML file; missing sections fall back to defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EtlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a stage meaningless
    pub fn validate(&self) -> Result<()> {
        if self.validation.allowed_flat_types.is_empty() {
            return Err(EtlError::Config("validation.allowed_flat_types must not be empty".to_string()));
        }
        if self.lease.term_years <= 0 || self.lease.term_years > constants::MAX_LEASE_TERM_YEARS {
            return Err(EtlError::Config(format!(
                "lease.term_years must be within 1..={}, got {}",
                constants::MAX_LEASE_TERM_YEARS,
                self.lease.term_years
            )));
        }
        if !(self.anomaly.iqr_multiplier >= 0.0) {
            return Err(EtlError::Config(format!(
                "anomaly.iqr_multiplier must be non-negative, got {}",
                self.anomaly.iqr_multiplier
            )));
        }
        if !(self.anomaly.guard_min < self.anomaly.guard_max) {
            return Err(EtlError::Config(format!(
                "anomaly.guard_min ({}) must be below anomaly.guard_max ({})",
                self.anomaly.guard_min, self.anomaly.guard_max
            )));
        }
        if self.pii.digest_len == 0 || self.pii.digest_len > 64 {
            return Err(EtlError::Config(format!(
                "pii.digest_len must be within 1..=64, got {}",
                self.pii.digest_len
            )));
        }
        Ok(())
    }
}

/// Parse a run reference date given as `YYYY-MM` (first of the month) or `YYYY-MM-DD`
pub fn parse_reference_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d"))
        .map_err(|_| EtlError::InvalidReferenceDate(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference_date() {
        assert_eq!(
            parse_reference_date("2024-06").unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
        assert_eq!(
            parse_reference_date("2024-06-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
        );
        assert!(matches!(
            parse_reference_date("June 2024"),
            Err(EtlError::InvalidReferenceDate(_))
        ));
        assert!(parse_reference_date("2024-13").is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = EtlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.validation.allowed_flat_types.len(), 7);
        assert_eq!(config.anomaly.guard_max, 30000.0);
        assert_eq!(config.lease.term_years, 99);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EtlConfig::from_toml_str(
            r#"
            [anomaly]
            min_cohort_size = 4

            [storage]
            database_path = "/tmp/test.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.anomaly.min_cohort_size, 4);
        assert_eq!(config.anomaly.iqr_multiplier, 1.5);
        assert_eq!(config.storage.database_path, "/tmp/test.db");
        assert_eq!(config.storage.cleaned_table, "Cleaned");
        assert!(!config.report.anomaly_report);
    }

    #[test]
    fn test_report_section() {
        let config = EtlConfig::from_toml_str(
            r#"
            [report]
            anomaly_report = true
            output_dir = "/tmp/reports"
            "#,
        )
        .unwrap();
        assert!(config.report.anomaly_report);
        assert_eq!(config.report.output_dir, "/tmp/reports");
    }

    #[test]
    fn test_inverted_guard_is_rejected() {
        let result = EtlConfig::from_toml_str(
            r#"
            [anomaly]
            guard_min = 40000.0
            guard_max = 500.0
            "#,
        );
        assert!(matches!(result, Err(EtlError::Config(_))));
    }

    #[test]
    fn test_lease_term_must_be_bounded() {
        let oversized = EtlConfig::from_toml_str("[lease]\nterm_years = 200000000\n");
        assert!(matches!(oversized, Err(EtlError::Config(_))));

        let zero = EtlConfig::from_toml_str("[lease]\nterm_years = 0\n");
        assert!(matches!(zero, Err(EtlError::Config(_))));

        let longest = EtlConfig::from_toml_str("[lease]\nterm_years = 999\n").unwrap();
        assert_eq!(longest.lease.term_years, 999);
    }

    #[test]
    fn test_empty_flat_types_rejected() {
        let result = EtlConfig::from_toml_str(
            r#"
            [validation]
            allowed_flat_types = []
            "#,
        );
        assert!(matches!(result, Err(EtlError::Config(_))));
    }
}

//! Composite PII key derivation and salted masking.
//!
//! `PII_Key = "S" + block3 + town2 + month_mm + town_initial`, where `town2`
//! depends on the whole cleaned batch (first two digits of the town's total
//! resale price).

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::info;

use crate::config::PiiConfig;
use crate::error::{EtlError, Result};
use crate::pipeline::parse_year_month;
use crate::types::{Batch, ResaleRecord};

/// A cleaned record with its derived key
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRecord {
    pub record: ResaleRecord,
    pub pii_key: String,
}

/// A cleaned record with its masked key; the clear key is not carried
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedRecord {
    pub record: ResaleRecord,
    pub pii_masked: String,
}

/// First three digits found in the block number, left-padded with `0`
pub fn block_digits(block: &str) -> String {
    let digits: String = block.chars().filter(|c| c.is_ascii_digit()).take(3).collect();
    format!("{:0>3}", digits)
}

/// Two-digit month, or `00` when the month does not parse
pub fn month_digits(month: &str) -> String {
    parse_year_month(month)
        .map(|(_, m)| format!("{:02}", m))
        .unwrap_or_else(|| "00".to_string())
}

/// Uppercased first character of the town, or `X` for an empty town
pub fn town_initial(town: &str) -> String {
    town.chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_else(|| "X".to_string())
}

/// Per town: first two digits of the truncated sum of resale prices
pub fn town_price_prefixes(batch: &Batch) -> HashMap<String, String> {
    let mut sums: HashMap<String, f64> = HashMap::new();
    for record in batch {
        *sums.entry(record.town.clone()).or_insert(0.0) += record.resale_price.unwrap_or(0.0);
    }
    sums.into_iter()
        .map(|(town, sum)| {
            let whole = (sum.trunc() as i64).to_string();
            let prefix: String = whole.chars().take(2).collect();
            (town, format!("{:0>2}", prefix))
        })
        .collect()
}

fn pii_key(record: &ResaleRecord, prefixes: &HashMap<String, String>) -> String {
    let town2 = prefixes.get(&record.town).map(String::as_str).unwrap_or("00");
    format!(
        "S{}{}{}{}",
        block_digits(&record.block),
        town2,
        month_digits(&record.month),
        town_initial(&record.town)
    )
}

/// Attach a `PII_Key` to every record of the cleaned batch, preserving order
pub fn build_pii_keys(cleaned: &Batch) -> Vec<KeyedRecord> {
    let prefixes = town_price_prefixes(cleaned);
    cleaned
        .iter()
        .map(|record| KeyedRecord {
            pii_key: pii_key(record, &prefixes),
            record: record.clone(),
        })
        .collect()
}

/// Salted SHA-256 masking of PII keys
pub struct Masker {
    salt: String,
    digest_len: usize,
}

impl Masker {
    pub fn new(salt: impl Into<String>, digest_len: usize) -> Result<Self> {
        let salt = salt.into();
        if salt.is_empty() {
            return Err(EtlError::Config("PII salt must not be empty".to_string()));
        }
        if digest_len == 0 || digest_len > 64 {
            return Err(EtlError::Config(format!(
                "digest length {} outside 1..=64",
                digest_len
            )));
        }
        Ok(Self { salt, digest_len })
    }

    /// Build from config, reading the salt from the environment
    pub fn from_config(config: &PiiConfig) -> Result<Self> {
        Self::new(config.salt()?, config.digest_len)
    }

    /// Hex digest of `salt|value`, truncated
    pub fn mask(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(b"|");
        hasher.update(value.as_bytes());
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(self.digest_len);
        digest
    }

    pub fn mask_all(&self, keyed: &[KeyedRecord]) -> Vec<MaskedRecord> {
        let masked: Vec<MaskedRecord> = keyed
            .iter()
            .map(|k| MaskedRecord {
                record: k.record.clone(),
                pii_masked: self.mask(&k.pii_key),
            })
            .collect();
        info!("Masked {} PII keys", masked.len());
        masked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::record;

    #[test]
    fn test_block_digits() {
        assert_eq!(block_digits("174"), "174");
        assert_eq!(block_digits("5A"), "005");
        assert_eq!(block_digits("1234"), "123");
        assert_eq!(block_digits("A"), "000");
    }

    #[test]
    fn test_month_and_initial() {
        assert_eq!(month_digits("2015-01"), "01");
        assert_eq!(month_digits("2015-1"), "01");
        assert_eq!(month_digits("nonsense"), "00");
        assert_eq!(town_initial("bedok"), "B");
        assert_eq!(town_initial(""), "X");
    }

    #[test]
    fn test_key_uses_town_price_sum() {
        let a = record("BEDOK", "4 ROOM", 255000.0, 90.0);
        let b = record("BEDOK", "4 ROOM", 300000.0, 90.0);
        let c = record("YISHUN", "3 ROOM", 7.0, 60.0);

        let keyed = build_pii_keys(&Batch::new("cleaned", vec![a, b, c]));
        assert_eq!(keyed.len(), 3);
        // BEDOK total 555000 -> "55"; fixture block 174, month 2015-01
        assert_eq!(keyed[0].pii_key, "S1745501B");
        assert_eq!(keyed[1].pii_key, "S1745501B");
        assert_eq!(keyed[2].pii_key, "S1740701Y");
    }

    #[test]
    fn test_mask_is_deterministic_and_salted() {
        let masker = Masker::new("pepper", 24).unwrap();
        let first = masker.mask("S1745501B");
        assert_eq!(first.len(), 24);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(first, masker.mask("S1745501B"));
        assert_ne!(first, masker.mask("S1745502B"));

        let other = Masker::new("salt", 24).unwrap();
        assert_ne!(first, other.mask("S1745501B"));

        let full = Masker::new("pepper", 64).unwrap().mask("S1745501B");
        assert!(full.starts_with(&first));
    }

    #[test]
    fn test_masker_rejects_bad_settings() {
        assert!(Masker::new("", 24).is_err());
        assert!(Masker::new("s", 0).is_err());
        assert!(Masker::new("s", 65).is_err());
    }

    #[test]
    fn test_mask_all_preserves_order() {
        let keyed = build_pii_keys(&Batch::new(
            "cleaned",
            vec![
                record("BEDOK", "4 ROOM", 1.0, 90.0),
                record("YISHUN", "4 ROOM", 2.0, 90.0),
            ],
        ));
        let masker = Masker::new("pepper", 24).unwrap();
        let masked = masker.mask_all(&keyed);
        assert_eq!(masked.len(), 2);
        assert_eq!(masked[1].record.town, "YISHUN");
        assert_eq!(masked[1].pii_masked, masker.mask(&keyed[1].pii_key));
    }
}

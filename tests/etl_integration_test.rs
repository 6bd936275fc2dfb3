use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

use hdb_resale_etl::pii::Masker;
use hdb_resale_etl::storage::SqliteSink;
use hdb_resale_etl::{EtlConfig, EtlError, EtlRunner};

const RECENT: &str = "month,town,flat_type,block,street_name,storey_range,floor_area_sqm,flat_model,lease_commence_date,remaining_lease,resale_price
2017-01,BEDOK,4 ROOM,101,BEDOK NTH RD,04 TO 06,100,Model A,1990,72 years,\"500,000\"
2017-01,BEDOK,4 ROOM,101,BEDOK NTH RD,04 TO 06,100,Model A,1990,72 years,\"480,000\"
2017-02,BEDOK,4 ROOM,102,BEDOK NTH RD,01 TO 03,100,Model A,1990,,510000
2017-03,BEDOK,4 ROOM,103,BEDOK  NTH RD,07 TO 09,100,Model A,1990,,520000
2017-04,BEDOK,4 ROOM,104,BEDOK NTH RD,10 TO 12,100,Model A,1990,,\"2,500,000\"
2017-05,BEDOK,7 ROOM,105,BEDOK NTH RD,10 TO 12,100,Model A,1990,,500000
";

// Older extract without the remaining_lease column
const OLDER: &str = "month,town,flat_type,block,street_name,storey_range,floor_area_sqm,flat_model,lease_commence_date,resale_price
2018-01,YISHUN,5 ROOM,801,YISHUN RING RD,04 TO 06,120,Improved,1988,480000
2018-13,YISHUN,5 ROOM,802,YISHUN RING RD,04 TO 06,120,Improved,1988,480000
";

fn write_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let recent = dir.join("recent.csv");
    let older = dir.join("older.csv");
    std::fs::write(&recent, RECENT)?;
    std::fs::write(&older, OLDER)?;
    Ok(vec![recent, older])
}

fn reference() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn count(conn: &Connection, relation: &str) -> Result<i64> {
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", relation), [], |row| row.get(0))?)
}

fn run_into_db(config: EtlConfig) -> Result<(TempDir, PathBuf, hdb_resale_etl::RunSummary)> {
    let dir = tempdir()?;
    let inputs = write_inputs(dir.path())?;
    let db_path = dir.path().join("out").join("etl.db");

    let mut sink = SqliteSink::open(&db_path)?;
    let masker = Masker::new("test-salt", 24)?;
    let summary = EtlRunner::new(config, reference()).run(&inputs, &mut sink, &masker)?;
    Ok((dir, db_path, summary))
}

#[test]
fn test_full_run_into_sqlite() -> Result<()> {
    let (_dir, db_path, summary) = run_into_db(EtlConfig::default())?;

    assert_eq!(summary.raw_count, 8);
    assert_eq!(summary.cleaned_count, 4);
    assert_eq!(summary.failed_count, 4);
    assert!(summary.is_balanced());
    assert_eq!(summary.failed_by_reason["basic_validation"], 2);
    assert_eq!(summary.failed_by_reason["duplicate_lower_price"], 1);
    assert_eq!(summary.failed_by_reason["anomaly_ppsqm"], 1);

    let conn = Connection::open(&db_path)?;
    assert_eq!(count(&conn, "Raw")?, 8);
    assert_eq!(count(&conn, "Cleaned")?, 4);
    assert_eq!(count(&conn, "Failed")?, 4);
    assert_eq!(count(&conn, "Transformed")?, 4);
    assert_eq!(count(&conn, "Masked")?, 4);

    // The kept duplicate is the higher price
    let price: f64 = conn.query_row(
        "SELECT resale_price FROM Cleaned WHERE block = '101'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(price, 500000.0);

    let dropped_price: f64 = conn.query_row(
        "SELECT resale_price FROM Failed WHERE fail_reason = 'duplicate_lower_price'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(dropped_price, 480000.0);

    let anomaly_block: String = conn.query_row(
        "SELECT block FROM Failed WHERE fail_reason = 'anomaly_ppsqm'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(anomaly_block, "104");
    Ok(())
}

#[test]
fn test_lease_and_normalization_are_persisted() -> Result<()> {
    let (_dir, db_path, _) = run_into_db(EtlConfig::default())?;
    let conn = Connection::open(&db_path)?;

    let (months, text): (i64, String) = conn.query_row(
        "SELECT remaining_lease_months, remaining_lease FROM Cleaned WHERE block = '103'",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    // 1990 + 99 = 2089 expiry, measured at June 2024
    assert_eq!(months, 775);
    assert_eq!(text, "64 years 7 months");

    let street: String = conn.query_row(
        "SELECT street_name FROM Cleaned WHERE block = '103'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(street, "BEDOK NTH RD");

    // Raw keeps the source text; absent values become the sentinel
    let raw_lease: String = conn.query_row(
        "SELECT remaining_lease FROM Raw WHERE block = '801'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(raw_lease, "-1");
    Ok(())
}

#[test]
fn test_pii_keys_and_masks() -> Result<()> {
    let (_dir, db_path, _) = run_into_db(EtlConfig::default())?;
    let conn = Connection::open(&db_path)?;

    // BEDOK cleaned total 1,530,000 -> "15"; YISHUN 480,000 -> "48"
    let bedok: String = conn.query_row(
        "SELECT PII_Key FROM Transformed WHERE block = '101'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(bedok, "S1011501B");
    let yishun: String = conn.query_row(
        "SELECT PII_Key FROM Transformed WHERE block = '801'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(yishun, "S8014801Y");

    let masked: String = conn.query_row(
        "SELECT PII_Masked FROM Masked WHERE block = '101'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(masked, Masker::new("test-salt", 24)?.mask("S1011501B"));

    let has_clear_key: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('Masked') WHERE name = 'PII_Key'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(has_clear_key, 0);
    Ok(())
}

#[test]
fn test_views_are_created() -> Result<()> {
    let (_dir, db_path, summary) = run_into_db(EtlConfig::default())?;
    let conn = Connection::open(&db_path)?;

    assert_eq!(count(&conn, "town_BEDOK")?, 3);
    assert_eq!(count(&conn, "town_YISHUN")?, 1);
    assert_eq!(count(&conn, "Cleaned_with_storeys")?, 4);
    // "04 TO 06" in both towns
    assert_eq!(count(&conn, "Floor_04")?, 2);
    assert_eq!(count(&conn, "Floor_09")?, 1);
    // 10 TO 12 was only on rejected rows
    assert!(!summary.views.contains(&"Floor_10".to_string()));
    Ok(())
}

#[test]
fn test_anomaly_reports_by_town() -> Result<()> {
    let reports_dir = tempdir()?;
    let mut config = EtlConfig::default();
    config.report.anomaly_report = true;
    config.report.output_dir = reports_dir.path().display().to_string();

    let (_dir, _db_path, summary) = run_into_db(config)?;
    let town_dir = reports_dir.path().join("anomalies_by_town");
    assert_eq!(summary.anomaly_reports.len(), 2);
    assert!(town_dir.join("YISHUN.json").exists());

    let bedok: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(town_dir.join("BEDOK.json"))?)?;
    assert_eq!(bedok["town"], "BEDOK");
    // ppsqm 5000, 5100, 5200, 25000 after dedupe
    let cohort = &bedok["cohorts"][0];
    assert_eq!(cohort["flat_type"], "4 ROOM");
    assert_eq!(cohort["size"], 4);
    assert_eq!(cohort["q1"], 5075.0);
    assert_eq!(cohort["q3"], 10150.0);

    let anomalies = bedok["anomalies"].as_array().unwrap();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0]["block"], "104");
    assert_eq!(anomalies[0]["price_per_sqm"], 25000.0);
    Ok(())
}

#[test]
fn test_anomaly_reports_off_by_default() -> Result<()> {
    let (dir, _db_path, summary) = run_into_db(EtlConfig::default())?;
    assert!(summary.anomaly_reports.is_empty());
    assert!(!dir.path().join("anomalies_by_town").exists());
    Ok(())
}

#[test]
fn test_configured_tables_without_views() -> Result<()> {
    let config = EtlConfig::from_toml_str(
        r#"
        [storage]
        cleaned_table = "resale_clean"
        failed_table = "resale_failed"
        create_views = false
        "#,
    )?;
    let (_dir, db_path, summary) = run_into_db(config)?;
    assert!(summary.views.is_empty());

    let conn = Connection::open(&db_path)?;
    assert_eq!(count(&conn, "resale_clean")?, 4);
    assert_eq!(count(&conn, "resale_failed")?, 4);
    let views: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'view'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(views, 0);
    Ok(())
}

#[test]
fn test_rerun_replaces_tables() -> Result<()> {
    let dir = tempdir()?;
    let inputs = write_inputs(dir.path())?;
    let db_path = dir.path().join("etl.db");
    let masker = Masker::new("test-salt", 24)?;
    let runner = EtlRunner::new(EtlConfig::default(), reference());

    let mut sink = SqliteSink::open(&db_path)?;
    let first = runner.run(&inputs, &mut sink, &masker)?;
    let second = runner.run(&inputs, &mut sink, &masker)?;
    assert_eq!(first.tables, second.tables);
    assert_eq!(first.views, second.views);

    let conn = Connection::open(&db_path)?;
    assert_eq!(count(&conn, "Cleaned")?, 4);
    assert_eq!(count(&conn, "Failed")?, 4);
    Ok(())
}

#[test]
fn test_missing_column_aborts_before_writing() -> Result<()> {
    let dir = tempdir()?;
    let broken = dir.path().join("broken.csv");
    std::fs::write(&broken, "month,town,flat_type\n2017-01,BEDOK,4 ROOM\n")?;
    let db_path = dir.path().join("etl.db");

    let mut sink = SqliteSink::open(&db_path)?;
    let masker = Masker::new("test-salt", 24)?;
    let err = EtlRunner::new(EtlConfig::default(), reference())
        .run(&[broken], &mut sink, &masker)
        .unwrap_err();
    assert!(matches!(err, EtlError::MissingField(_)));

    let conn = Connection::open(&db_path)?;
    let tables: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(tables, 0);
    Ok(())
}

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use hdb_resale_etl::config::{parse_reference_date, EtlConfig};
use hdb_resale_etl::logging;
use hdb_resale_etl::metrics as etl_metrics;
use hdb_resale_etl::pii::Masker;
use hdb_resale_etl::storage::SqliteSink;
use hdb_resale_etl::{EtlRunner, RunSummary};

#[derive(Parser)]
#[command(name = "hdb-etl")]
#[command(about = "HDB resale transactions ETL: clean, dedupe, screen, mask, load")]
#[command(version)]
struct Cli {
    /// Directory for rotated JSON logs
    #[arg(long, global = true, default_value = "logs")]
    log_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full ETL into a SQLite database
    Run {
        /// Source CSV files, concatenated in order
        #[arg(long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Database path; overrides storage.database_path
        #[arg(long)]
        db: Option<PathBuf>,
        /// Reference date, YYYY-MM or YYYY-MM-DD (default: today)
        #[arg(long)]
        reference_date: Option<String>,
        /// Write the run summary as JSON
        #[arg(long)]
        summary_json: Option<PathBuf>,
        /// Write a Prometheus metrics snapshot at the end of the run
        #[arg(long)]
        metrics_out: Option<PathBuf>,
        /// Write per-town anomaly reports under <DIR>/anomalies_by_town
        #[arg(long, value_name = "DIR")]
        anomaly_report: Option<PathBuf>,
    },
    /// Run the cleaning stages only and print the stage summary
    Check {
        #[arg(long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        reference_date: Option<String>,
        #[arg(long)]
        summary_json: Option<PathBuf>,
        #[arg(long, value_name = "DIR")]
        anomaly_report: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EtlConfig> {
    match path {
        Some(p) => EtlConfig::load(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(EtlConfig::default()),
    }
}

fn enable_anomaly_report(config: &mut EtlConfig, dir: Option<PathBuf>) {
    if let Some(dir) = dir {
        config.report.anomaly_report = true;
        config.report.output_dir = dir.display().to_string();
    }
}

fn reference_date(value: Option<&str>) -> anyhow::Result<NaiveDate> {
    match value {
        Some(v) => Ok(parse_reference_date(v)?),
        None => Ok(Local::now().date_naive()),
    }
}

fn finish(summary: &RunSummary, summary_json: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", summary.render_text());
    if let Some(path) = summary_json {
        summary
            .write_json(path)
            .with_context(|| format!("writing summary to {}", path.display()))?;
        info!("Wrote run summary to {}", path.display());
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run {
            input,
            config,
            db,
            reference_date: reference,
            summary_json,
            metrics_out,
            anomaly_report,
        } => {
            let mut config = load_config(config.as_deref())?;
            enable_anomaly_report(&mut config, anomaly_report);
            if let Some(db) = db {
                config.storage.database_path = db.display().to_string();
            }
            let reference = reference_date(reference.as_deref())?;
            let masker = Masker::from_config(&config.pii).context("PII masking is not configured")?;

            etl_metrics::init_metrics();
            println!("🚀 Running ETL (reference {})...", reference);

            let mut sink = SqliteSink::open(&config.storage.database_path)?;
            let summary = EtlRunner::new(config, reference).run(&input, &mut sink, &masker)?;
            finish(&summary, summary_json.as_deref())?;

            if let Some(path) = metrics_out {
                match etl_metrics::render() {
                    Some(snapshot) => {
                        std::fs::write(&path, snapshot)
                            .with_context(|| format!("writing metrics to {}", path.display()))?;
                        info!("Wrote metrics snapshot to {}", path.display());
                    }
                    None => error!("Metrics recorder unavailable; no snapshot written"),
                }
            }
            println!("✅ ETL run completed");
        }
        Commands::Check {
            input,
            config,
            reference_date: reference,
            summary_json,
            anomaly_report,
        } => {
            let mut config = load_config(config.as_deref())?;
            enable_anomaly_report(&mut config, anomaly_report);
            let reference = reference_date(reference.as_deref())?;
            println!("🔍 Checking {} input files (reference {})...", input.len(), reference);

            let summary = EtlRunner::new(config, reference).check(&input)?;
            finish(&summary, summary_json.as_deref())?;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _guard = logging::init_logging(&cli.log_dir);

    if let Err(e) = run(cli) {
        error!("ETL failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

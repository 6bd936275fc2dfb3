pub mod config;
pub mod constants;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod pii;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod storage;
pub mod summary;
pub mod types;

pub use config::EtlConfig;
pub use error::{EtlError, Result};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use runner::EtlRunner;
pub use summary::RunSummary;
pub use types::{Batch, FailReason, FailedRecord, ResaleRecord};

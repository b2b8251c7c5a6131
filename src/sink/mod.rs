//! Batch destinations.
//!
//! A [`Sink`] receives finished batch containers. The base sinks load into
//! BigQuery or write into a directory; [`RetryingSink`] and [`SpillingSink`]
//! wrap any sink to change what happens when a write fails.

pub mod auth;
pub mod bigquery;
pub mod directory;
pub mod retry;
pub mod spill;

use crate::config::types::{Config, DeliveryConfig, Partitioning, SinkConfig, TableConfig};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use auth::{ServiceAccountTokenProvider, StaticToken, TokenSource};
pub use bigquery::BigQuerySink;
pub use directory::DirectorySink;
pub use retry::{RetryPolicy, RetryingSink};
pub use spill::SpillingSink;

/// Statistics reported by the destination for one completed load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub total_bytes_processed: u64,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub output_rows: u64,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to sign access token request: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("sink returned error status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("load job {job_id} failed: {message}")]
    Job {
        job_id: String,
        /// `errorResult.reason`, or `timeout` when the job never finished
        reason: String,
        message: String,
    },

    #[error("batch spilled to {path} after write failure: {source}")]
    Spilled {
        path: PathBuf,
        #[source]
        source: Box<SinkError>,
    },
}

impl SinkError {
    /// Whether another attempt at the same write could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SinkError::Http(_) | SinkError::Io(_) => true,
            SinkError::Status { status, .. } => *status == 429 || *status >= 500,
            // Anything else (invalid, notFound, a timed out job that may
            // still load) would fail or duplicate the same way again
            SinkError::Job { reason, .. } => matches!(
                reason.as_str(),
                "backendError" | "internalError" | "rateLimitExceeded"
            ),
            SinkError::Auth(_) => true,
            SinkError::Json(_) | SinkError::Token(_) | SinkError::Spilled { .. } => false,
        }
    }
}

#[async_trait]
pub trait Sink: Send + Sync {
    /// Loads one batch container into `table_id`
    async fn write(&self, batch: Bytes, table_id: &str) -> Result<LoadStats, SinkError>;
}

/// Table a batch written at `now` belongs to
pub fn resolve_table_id(table: &TableConfig, now: DateTime<Utc>) -> String {
    match table.partitioning {
        Partitioning::None => table.table_id.clone(),
        Partitioning::Daily => format!("{}_{}", table.table_id, now.format("%Y%m%d")),
    }
}

async fn base_sink(config: &Config) -> Result<Arc<dyn Sink>, SinkError> {
    Ok(match &config.sink {
        SinkConfig::Bigquery(bq) => Arc::new(BigQuerySink::from_config(bq).await?),
        SinkConfig::Directory(dir) => Arc::new(DirectorySink::new(&dir.path)?),
    })
}

/// Builds the configured sink wrapped in the configured failure policy
pub async fn build_sink(config: &Config) -> Result<Arc<dyn Sink>, SinkError> {
    Ok(wrap_sink(base_sink(config).await?, &config.delivery, true))
}

/// Like [`build_sink`] but never spills, so replayed files are not copied
/// back into the spill directory
pub async fn build_replay_sink(config: &Config) -> Result<Arc<dyn Sink>, SinkError> {
    Ok(wrap_sink(base_sink(config).await?, &config.delivery, false))
}

fn wrap_sink(base: Arc<dyn Sink>, delivery: &DeliveryConfig, spill: bool) -> Arc<dyn Sink> {
    let policy = RetryPolicy::from(&delivery.retry);
    let sink: Arc<dyn Sink> = if policy.max_attempts > 1 {
        Arc::new(RetryingSink::new(base, policy))
    } else {
        base
    };

    match &delivery.spill_dir {
        Some(dir) if spill => Arc::new(SpillingSink::new(sink, dir.clone())),
        _ => sink,
    }
}

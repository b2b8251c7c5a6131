use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub sink: SinkConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    pub geoip: Option<GeoIpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Header carrying the client address, set by the fronting proxy
    #[serde(default = "default_ip_header")]
    pub ip_header: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ip_header: default_ip_header(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:80".to_string()
}

fn default_ip_header() -> String {
    "X-Client-IP".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Unprocessed reports held between the front door and the accumulator
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,
    #[serde(default = "default_size_threshold_bytes")]
    pub size_threshold_bytes: usize,
    #[serde(default = "default_age_threshold", with = "humantime_serde")]
    pub age_threshold: Duration,
    /// How often an idle accumulator re-checks the age threshold
    #[serde(default = "default_tick_interval", with = "humantime_serde")]
    pub tick_interval: Duration,
    #[serde(default = "default_records_per_block")]
    pub records_per_block: usize,
    #[serde(default)]
    pub codec: CodecName,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            intake_capacity: default_intake_capacity(),
            size_threshold_bytes: default_size_threshold_bytes(),
            age_threshold: default_age_threshold(),
            tick_interval: default_tick_interval(),
            records_per_block: default_records_per_block(),
            codec: CodecName::default(),
        }
    }
}

fn default_intake_capacity() -> usize {
    128
}

/// BigQuery rejects load requests over 10MB
fn default_size_threshold_bytes() -> usize {
    9 * 1024 * 1024
}

fn default_age_threshold() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_records_per_block() -> usize {
    100
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecName {
    Null,
    Deflate,
    #[default]
    Zstandard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    Bigquery(BigQueryConfig),
    Directory(DirectorySinkConfig),
}

impl SinkConfig {
    pub fn table(&self) -> TableConfig {
        match self {
            SinkConfig::Bigquery(bq) => TableConfig {
                table_id: bq.table_id.clone(),
                partitioning: bq.partitioning,
            },
            SinkConfig::Directory(dir) => TableConfig {
                table_id: dir.table_id.clone(),
                partitioning: dir.partitioning,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigQueryConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    /// Service account key file
    pub credentials_path: PathBuf,
    #[serde(default)]
    pub partitioning: Partitioning,
    pub location: Option<String>,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Longest wait for a load job to reach DONE
    #[serde(default = "default_job_timeout", with = "humantime_serde")]
    pub job_timeout: Duration,
    /// Overrides the BigQuery API root, for emulators
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
}

fn default_api_endpoint() -> String {
    "https://bigquery.googleapis.com".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_job_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySinkConfig {
    pub path: PathBuf,
    #[serde(default = "default_directory_table_id")]
    pub table_id: String,
    #[serde(default)]
    pub partitioning: Partitioning,
}

fn default_directory_table_id() -> String {
    "events".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partitioning {
    None,
    /// Suffix the table id with the current UTC date (`events_20260119`)
    #[default]
    Daily,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub table_id: String,
    pub partitioning: Partitioning,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    /// Failed batches are written here instead of being dropped
    pub spill_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per batch; 1 disables retries
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_multiplier() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    /// GeoLite2 ASN database
    pub asn_db_path: PathBuf,
    /// GeoLite2 City database
    pub city_db_path: PathBuf,
}

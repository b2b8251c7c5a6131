use super::auth::{ServiceAccountTokenProvider, TokenSource};
use super::{LoadStats, Sink, SinkError};
use crate::config::types::BigQueryConfig;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const MULTIPART_BOUNDARY: &str = "atmon_batch_boundary";

/// Loads batches into BigQuery with one load job per batch
pub struct BigQuerySink {
    client: reqwest::Client,
    token: Arc<dyn TokenSource>,
    project_id: String,
    dataset_id: String,
    location: Option<String>,
    endpoint: String,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl BigQuerySink {
    /// Reads the service account key and prepares the HTTP client
    pub async fn from_config(config: &BigQueryConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let provider =
            ServiceAccountTokenProvider::from_file(&config.credentials_path, client.clone()).await?;

        info!(
            project_id = %config.project_id,
            dataset_id = %config.dataset_id,
            client_email = %provider.client_email(),
            "BigQuery sink ready"
        );

        Ok(Self::with_token_source(config, client, Arc::new(provider)))
    }

    pub fn with_token_source(
        config: &BigQueryConfig,
        client: reqwest::Client,
        token: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client,
            token,
            project_id: config.project_id.clone(),
            dataset_id: config.dataset_id.clone(),
            location: config.location.clone(),
            endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
            poll_interval: config.poll_interval,
            job_timeout: config.job_timeout,
        }
    }

    fn load_job(&self, job_id: &str, table_id: &str) -> serde_json::Value {
        let mut reference = json!({
            "projectId": self.project_id,
            "jobId": job_id,
        });
        if let Some(location) = &self.location {
            reference["location"] = json!(location);
        }

        json!({
            "jobReference": reference,
            "configuration": {
                "load": {
                    "destinationTable": {
                        "projectId": self.project_id,
                        "datasetId": self.dataset_id,
                        "tableId": table_id,
                    },
                    "sourceFormat": "AVRO",
                    "useAvroLogicalTypes": true,
                    "createDisposition": "CREATE_IF_NEEDED",
                    "writeDisposition": "WRITE_APPEND",
                }
            }
        })
    }

    async fn insert_job(&self, batch: &[u8], table_id: &str) -> Result<Job, SinkError> {
        let job_id = format!("atmon_{}", uuid::Uuid::new_v4().simple());
        let metadata = serde_json::to_vec(&self.load_job(&job_id, table_id))?;
        let body = multipart_related(&metadata, batch);

        let url = format!(
            "{}/upload/bigquery/v2/projects/{}/jobs?uploadType=multipart",
            self.endpoint, self.project_id
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token.token().await?)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(body)
            .send()
            .await?;

        parse_job(response).await
    }

    async fn get_job(&self, reference: &JobReference) -> Result<Job, SinkError> {
        let url = format!(
            "{}/bigquery/v2/projects/{}/jobs/{}",
            self.endpoint, self.project_id, reference.job_id
        );
        let mut request = self
            .client
            .get(&url)
            .bearer_auth(self.token.token().await?);
        if let Some(location) = reference.location.as_ref().or(self.location.as_ref()) {
            request = request.query(&[("location", location)]);
        }

        parse_job(request.send().await?).await
    }
}

#[async_trait]
impl Sink for BigQuerySink {
    async fn write(&self, batch: Bytes, table_id: &str) -> Result<LoadStats, SinkError> {
        let job = self.insert_job(&batch, table_id).await?;
        let reference = job.job_reference.clone();
        debug!(job_id = %reference.job_id, table_id, "Load job created");

        let poll = async {
            let mut job = job;
            while !job.status.is_done() {
                tokio::time::sleep(self.poll_interval).await;
                job = self.get_job(&job.job_reference).await?;
            }
            Ok::<_, SinkError>(job)
        };

        match tokio::time::timeout(self.job_timeout, poll).await {
            Ok(job) => job?.into_result(),
            Err(_) => Err(SinkError::Job {
                job_id: reference.job_id,
                reason: "timeout".to_string(),
                message: format!("not done after {:?}", self.job_timeout),
            }),
        }
    }
}

/// `multipart/related` body carrying the job resource then the batch
fn multipart_related(metadata: &[u8], data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + data.len() + 256);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n",
            MULTIPART_BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(metadata);
    body.extend_from_slice(
        format!(
            "\r\n--{}\r\nContent-Type: application/octet-stream\r\n\r\n",
            MULTIPART_BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

async fn parse_job(response: reqwest::Response) -> Result<Job, SinkError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&text)
            .map(|e| e.error.message)
            .unwrap_or(text);
        return Err(SinkError::Status { status, message });
    }
    Ok(response.json().await?)
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub job_id: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorProto {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub state: String,
    pub error_result: Option<ErrorProto>,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

impl JobStatus {
    fn is_done(&self) -> bool {
        self.state == "DONE"
    }
}

/// Int64 statistics arrive as JSON strings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStatistics {
    pub input_file_bytes: Option<String>,
    pub output_bytes: Option<String>,
    pub output_rows: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatistics {
    pub total_bytes_processed: Option<String>,
    pub load: Option<LoadStatistics>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_reference: JobReference,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub statistics: JobStatistics,
}

fn parse_count(value: &Option<String>) -> u64 {
    value.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0)
}

impl Job {
    fn into_result(self) -> Result<LoadStats, SinkError> {
        if let Some(error) = self.status.error_result {
            let mut message = format!("{}: {}", error.reason, error.message);
            // The first entry usually repeats error_result
            for detail in self.status.errors.iter().skip(1) {
                message.push_str(&format!("; {}", detail.message));
            }
            return Err(SinkError::Job {
                job_id: self.job_reference.job_id,
                reason: error.reason,
                message,
            });
        }

        let load = self.statistics.load.unwrap_or_default();
        Ok(LoadStats {
            total_bytes_processed: parse_count(&self.statistics.total_bytes_processed),
            input_bytes: parse_count(&load.input_file_bytes),
            output_bytes: parse_count(&load.output_bytes),
            output_rows: parse_count(&load.output_rows),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(body: serde_json::Value) -> Job {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_done_job_statistics() {
        let job = job(json!({
            "jobReference": {"projectId": "p", "jobId": "atmon_1", "location": "US"},
            "status": {"state": "DONE"},
            "statistics": {
                "totalBytesProcessed": "4096",
                "load": {"inputFileBytes": "4096", "outputBytes": "9000", "outputRows": "37"}
            }
        }));

        assert!(job.status.is_done());
        assert_eq!(
            job.into_result().unwrap(),
            LoadStats {
                total_bytes_processed: 4096,
                input_bytes: 4096,
                output_bytes: 9000,
                output_rows: 37,
            }
        );
    }

    #[test]
    fn test_job_error_result() {
        let job = job(json!({
            "jobReference": {"jobId": "atmon_2"},
            "status": {
                "state": "DONE",
                "errorResult": {"reason": "invalid", "message": "Provided Schema does not match Table"},
                "errors": [
                    {"reason": "invalid", "message": "Provided Schema does not match Table"},
                    {"reason": "invalid", "message": "Field geo has changed type"}
                ]
            }
        }));

        match job.into_result() {
            Err(SinkError::Job {
                job_id,
                reason,
                message,
            }) => {
                assert_eq!(job_id, "atmon_2");
                assert_eq!(reason, "invalid");
                assert!(message.starts_with("invalid: Provided Schema"));
                assert!(message.contains("Field geo has changed type"));
            }
            other => panic!("expected job error, got {:?}", other),
        }
    }

    #[test]
    fn test_running_job_not_done() {
        let job = job(json!({"jobReference": {"jobId": "j"}, "status": {"state": "RUNNING"}}));
        assert!(!job.status.is_done());
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = multipart_related(b"{}", b"Obj\x01");
        let text = String::from_utf8_lossy(&body);

        assert!(text.starts_with("--atmon_batch_boundary\r\nContent-Type: application/json"));
        assert!(text.contains("\r\n\r\n{}\r\n--atmon_batch_boundary\r\n"));
        assert!(text.ends_with("Obj\u{1}\r\n--atmon_batch_boundary--\r\n"));
    }
}

use super::types::*;
use crate::config::{expand_env_vars, expand_tilde};
use regex::Regex;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Parse and validate a config document
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    // Expand environment variables before parsing so they work in any field
    let yaml = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml)?;

    let mut config: Config = serde_yaml::from_str(&yaml)?;
    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex");
    let mut unexpanded_vars: Vec<String> = re
        .captures_iter(yaml_string)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}\n\
         \n\
         Set them before starting atmon, or replace $env{{...}} in the config file with literal values",
        unexpanded_vars.join(", ")
    )))
}

fn expand_paths(config: &mut Config) {
    match &mut config.sink {
        SinkConfig::Bigquery(bq) => bq.credentials_path = expand_tilde(&bq.credentials_path),
        SinkConfig::Directory(dir) => dir.path = expand_tilde(&dir.path),
    }

    if let Some(spill_dir) = config.delivery.spill_dir.as_mut() {
        *spill_dir = expand_tilde(spill_dir);
    }

    if let Some(geoip) = config.geoip.as_mut() {
        geoip.asn_db_path = expand_tilde(&geoip.asn_db_path);
        geoip.city_db_path = expand_tilde(&geoip.city_db_path);
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_server(&config.server, &mut errors);
    validate_pipeline(&config.pipeline, &mut errors);
    validate_sink(&config.sink, &mut errors);
    validate_delivery(&config.delivery, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_server(server: &ServerConfig, errors: &mut Vec<String>) {
    if server.listen.parse::<SocketAddr>().is_err() {
        errors.push(format!(
            "server.listen: invalid socket address '{}'",
            server.listen
        ));
    }

    if axum::http::HeaderName::from_bytes(server.ip_header.as_bytes()).is_err() {
        errors.push(format!(
            "server.ip_header: invalid header name '{}'",
            server.ip_header
        ));
    }

    for origin in &server.cors_origins {
        if origin != "*" && axum::http::HeaderValue::from_str(origin).is_err() {
            errors.push(format!("server.cors_origins: invalid origin '{}'", origin));
        }
    }
}

fn validate_pipeline(pipeline: &PipelineConfig, errors: &mut Vec<String>) {
    if pipeline.intake_capacity == 0 {
        errors.push("pipeline.intake_capacity must be greater than 0".to_string());
    }

    if pipeline.size_threshold_bytes == 0 {
        errors.push("pipeline.size_threshold_bytes must be greater than 0".to_string());
    }

    if pipeline.records_per_block == 0 {
        errors.push("pipeline.records_per_block must be greater than 0".to_string());
    }

    if pipeline.age_threshold.is_zero() {
        errors.push("pipeline.age_threshold must be greater than 0".to_string());
    }

    if pipeline.tick_interval.is_zero() {
        errors.push("pipeline.tick_interval must be greater than 0".to_string());
    }
}

fn validate_sink(sink: &SinkConfig, errors: &mut Vec<String>) {
    match sink {
        SinkConfig::Bigquery(bq) => {
            for (field, value) in [
                ("project_id", &bq.project_id),
                ("dataset_id", &bq.dataset_id),
                ("table_id", &bq.table_id),
            ] {
                if value.is_empty() {
                    errors.push(format!("sink.{} cannot be empty", field));
                }
            }

            if bq.credentials_path.as_os_str().is_empty() {
                errors.push("sink.credentials_path cannot be empty".to_string());
            }

            if bq.poll_interval.is_zero() {
                errors.push("sink.poll_interval must be greater than 0".to_string());
            }

            if bq.job_timeout < bq.poll_interval {
                errors.push("sink.job_timeout cannot be shorter than poll_interval".to_string());
            }
        }
        SinkConfig::Directory(dir) => {
            if dir.path.as_os_str().is_empty() {
                errors.push("sink.path cannot be empty".to_string());
            }
            if dir.table_id.is_empty() {
                errors.push("sink.table_id cannot be empty".to_string());
            }
        }
    }
}

fn validate_delivery(delivery: &DeliveryConfig, errors: &mut Vec<String>) {
    let retry = &delivery.retry;

    if retry.max_attempts == 0 {
        errors.push("delivery.retry.max_attempts must be at least 1".to_string());
    }

    if !(retry.multiplier >= 1.0) {
        errors.push(format!(
            "delivery.retry.multiplier must be >= 1.0, got {}",
            retry.multiplier
        ));
    }

    if retry.initial_delay > retry.max_delay {
        errors.push("delivery.retry.initial_delay cannot exceed max_delay".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MINIMAL: &str = r#"
sink:
  type: directory
  path: /tmp/atmon-batches
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();

        assert_eq!(config.server.listen, "0.0.0.0:80");
        assert_eq!(config.server.ip_header, "X-Client-IP");
        assert_eq!(config.pipeline.intake_capacity, 128);
        assert_eq!(config.pipeline.size_threshold_bytes, 9 * 1024 * 1024);
        assert_eq!(config.pipeline.age_threshold, Duration::from_secs(600));
        assert_eq!(config.pipeline.records_per_block, 100);
        assert_eq!(config.pipeline.codec, CodecName::Zstandard);
        assert_eq!(config.delivery.retry.max_attempts, 1);
        assert!(config.delivery.spill_dir.is_none());
        assert!(config.geoip.is_none());
    }

    #[test]
    fn test_humantime_durations() {
        let yaml = r#"
pipeline:
  age_threshold: 30s
  tick_interval: 250ms
sink:
  type: directory
  path: /tmp/out
delivery:
  retry:
    max_attempts: 4
    initial_delay: 500ms
    max_delay: 1m
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.pipeline.age_threshold, Duration::from_secs(30));
        assert_eq!(config.pipeline.tick_interval, Duration::from_millis(250));
        assert_eq!(config.delivery.retry.max_attempts, 4);
        assert_eq!(config.delivery.retry.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let yaml = r#"
server:
  listen: not-an-address
pipeline:
  records_per_block: 0
  intake_capacity: 0
sink:
  type: bigquery
  project_id: ""
  dataset_id: telemetry
  table_id: events
  credentials_path: /etc/atmon/sa.json
"#;
        match parse_config(yaml) {
            Err(ConfigError::ValidationList(errors)) => {
                assert_eq!(errors.len(), 4, "{:?}", errors);
                assert!(errors.iter().any(|e| e.contains("server.listen")));
                assert!(errors.iter().any(|e| e.contains("records_per_block")));
                assert!(errors.iter().any(|e| e.contains("intake_capacity")));
                assert!(errors.iter().any(|e| e.contains("sink.project_id")));
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_unset_env_var_is_reported() {
        let yaml = r#"
sink:
  type: directory
  path: $env{ATMON_TEST_SURELY_UNSET_DIR}
"#;
        let err = parse_config(yaml).unwrap_err();
        assert!(err.to_string().contains("ATMON_TEST_SURELY_UNSET_DIR"));
    }

    #[test]
    fn test_unknown_sink_type_rejected() {
        let yaml = r#"
sink:
  type: kafka
  path: /tmp
"#;
        assert!(matches!(parse_config(yaml), Err(ConfigError::YamlParse(_))));
    }

    #[test]
    fn test_sink_table_config() {
        let yaml = r#"
sink:
  type: bigquery
  project_id: proj
  dataset_id: telemetry
  table_id: playback
  credentials_path: /etc/atmon/sa.json
  partitioning: none
"#;
        let config = parse_config(yaml).unwrap();
        let table = config.sink.table();
        assert_eq!(table.table_id, "playback");
        assert_eq!(table.partitioning, Partitioning::None);
    }
}

pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# ATMON CONFIGURATION
# =============================================================================
# atmon accepts playback telemetry reports over HTTP, enriches them with
# GeoIP data, and loads them into BigQuery in Avro batches.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/atmon/config.yml
#   3. /etc/atmon/config.yml
#
# Any value may reference an environment variable with $env{NAME}.

# =============================================================================
# SERVER
# =============================================================================
server:
  listen: 0.0.0.0:8080
  # Header set by the load balancer with the original client address
  ip_header: X-Client-IP
  cors_origins:
    - "*"

# =============================================================================
# PIPELINE
# =============================================================================
pipeline:
  # Reports waiting for the accumulator before producers start to wait
  intake_capacity: 128
  # A batch is shipped once its encoded size passes this many bytes
  size_threshold_bytes: 9437184
  # ...or once it has been open this long and holds at least one record
  age_threshold: 10m
  tick_interval: 1s
  records_per_block: 100
  # 'zstandard', 'deflate' or 'null'
  codec: zstandard

# =============================================================================
# SINK
# =============================================================================
sink:
  type: bigquery
  project_id: $env{ATMON_PROJECT_ID}
  dataset_id: telemetry
  table_id: events
  credentials_path: ~/.config/atmon/service-account.json
  # 'daily' appends _YYYYMMDD (UTC) to the table id, 'none' uses it as is
  partitioning: daily
  poll_interval: 2s
  # A load job still running after this is reported as failed
  job_timeout: 10m

# To write batches to local files instead:
#
# sink:
#   type: directory
#   path: /var/lib/atmon/batches
#   table_id: events

# =============================================================================
# DELIVERY
# =============================================================================
delivery:
  retry:
    # 1 means a failed load is not retried
    max_attempts: 3
    initial_delay: 1s
    max_delay: 1m
    multiplier: 2.0
  # Batches that still fail are written here; ship them later with
  # 'atmon replay <dir>'
  spill_dir: /var/lib/atmon/spill

# =============================================================================
# GEOIP (optional)
# =============================================================================
# geoip:
#   asn_db_path: /usr/share/GeoIP/GeoLite2-ASN.mmdb
#   city_db_path: /usr/share/GeoIP/GeoLite2-City.mmdb
"#
    .to_string()
}

use crate::config::parse::load_config;
use crate::config::types::Config;
use crate::geoip::{Enricher, EnrichmentError, MaxMindEnricher, NoEnrichment};
use crate::pipeline::{Pipeline, PipelineError};
use crate::sink::{build_sink, SinkError};
use crate::web::{build_router, start_server, AppState};
use axum::http::HeaderName;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("GeoIP error: {0}")]
    Enrichment(#[from] EnrichmentError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("invalid listen address: {0}")]
    Listen(#[from] std::net::AddrParseError),

    #[error("invalid ip_header: {0}")]
    Header(#[from] axum::http::header::InvalidHeaderName),

    #[error("web server error: {0}")]
    WebServer(#[from] std::io::Error),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/atmon/config.yml");
            eprintln!("  /etc/atmon/config.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'atmon config init' to generate one.");
            std::process::exit(1);
        }
    };

    run_service(&config_path).await.map_err(|e| e.into())
}

fn open_enricher(config: &Config) -> Result<Arc<dyn Enricher>, EnrichmentError> {
    match &config.geoip {
        Some(geoip) => Ok(Arc::new(MaxMindEnricher::open(geoip)?)),
        None => {
            warn!("No geoip databases configured, reports will not be enriched");
            Ok(Arc::new(NoEnrichment))
        }
    }
}

async fn run_service(config_path: &Path) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    let listen_addr: SocketAddr = config.server.listen.parse()?;
    let ip_header = HeaderName::from_bytes(config.server.ip_header.as_bytes())?;

    let enricher = open_enricher(&config)?;

    info!("Initializing sink");
    let sink = build_sink(&config).await?;

    let pipeline = Pipeline::start(&config.pipeline, sink, config.sink.table())?;

    let state = Arc::new(AppState {
        sender: pipeline.sender(),
        enricher,
        ip_header,
        stats: pipeline.stats(),
        start_time: Instant::now(),
    });
    let app = build_router(state, &config.server);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server_handle = tokio::spawn(start_server(listen_addr, app, shutdown_rx));

    info!("atmon started, press Ctrl+C to shutdown");

    let server_result = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            server_handle.await
        }
        result = &mut server_handle => result,
    };

    let server_error = match server_result {
        Ok(Ok(())) => {
            info!("Report API stopped");
            None
        }
        Ok(Err(e)) => {
            error!(error = %e, "Report API failed");
            Some(e)
        }
        Err(e) => {
            error!(error = %e, "Report API task join error");
            None
        }
    };

    info!("Draining pipeline");
    pipeline.shutdown().await?;

    info!("Shutdown complete");

    match server_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

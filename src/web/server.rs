use super::api::{get_status, health_check, method_not_allowed, not_found, post_report, AppState};
use crate::config::types::ServerConfig;
use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

pub fn build_router(state: Arc<AppState>, server: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/status", get(get_status))
        .route(
            "/api/v1/report",
            post(post_report).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&server.cors_origins)),
        )
}

/// Serve the report API until `shutdown_rx` flips to true
pub async fn start_server(
    listen_addr: SocketAddr,
    app: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(addr = %listener.local_addr()?, "Report API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|&v| v).await;
            info!("Report API shutting down gracefully");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{CodecName, Partitioning, PipelineConfig, TableConfig};
    use crate::geoip::{Enricher, EnrichmentError, NoEnrichment};
    use crate::pipeline::Pipeline;
    use crate::report::{Enrichment, Network};
    use crate::sink::tests::FlakySink;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::net::IpAddr;
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    struct AsnEnricher;

    impl Enricher for AsnEnricher {
        fn lookup(&self, _ip: IpAddr) -> Result<Enrichment, EnrichmentError> {
            Ok(Enrichment {
                network: Some(Network {
                    asn: 64500,
                    organization: "Example".to_string(),
                }),
                geo: None,
            })
        }
    }

    fn pipeline(sink: Arc<FlakySink>) -> Pipeline {
        let config = PipelineConfig {
            codec: CodecName::Null,
            age_threshold: Duration::from_secs(600),
            ..PipelineConfig::default()
        };
        let table = TableConfig {
            table_id: "events".to_string(),
            partitioning: Partitioning::None,
        };
        Pipeline::start(&config, sink, table).unwrap()
    }

    fn router(pipeline: &Pipeline, enricher: Arc<dyn Enricher>) -> Router {
        let state = Arc::new(AppState {
            sender: pipeline.sender(),
            enricher,
            ip_header: axum::http::HeaderName::from_static("x-client-ip"),
            stats: pipeline.stats(),
            start_time: Instant::now(),
        });
        build_router(state, &ServerConfig::default())
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_report_accepted() {
        let sink = Arc::new(FlakySink::default());
        let pipeline = pipeline(sink.clone());
        let app = router(&pipeline, Arc::new(AsnEnricher));

        let response = app
            .oneshot(
                Request::post("/api/v1/report")
                    .header("content-type", "application/json")
                    .header("x-client-ip", "192.0.2.10")
                    .body(Body::from(r#"{"play": [{"clientId": "c1", "sequence": 1}]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "{}");

        let snapshot = pipeline.shutdown().await.unwrap();
        assert_eq!(snapshot.reports_accepted, 1);
        assert_eq!(snapshot.records_encoded, 1);
        assert_eq!(sink.written.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let pipeline = pipeline(Arc::new(FlakySink::default()));
        let app = router(&pipeline, Arc::new(NoEnrichment));

        let response = app
            .oneshot(
                Request::post("/api/v1/report")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(response).await, r#"{"error":"bad request"}"#);
        assert_eq!(pipeline.stats().snapshot().reports_accepted, 0);
    }

    #[tokio::test]
    async fn test_wrong_method_on_report_route() {
        let pipeline = pipeline(Arc::new(FlakySink::default()));
        let app = router(&pipeline, Arc::new(NoEnrichment));

        let response = app
            .oneshot(
                Request::get("/api/v1/report")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            body_string(response).await,
            r#"{"error":"method not allowed"}"#
        );
    }

    #[tokio::test]
    async fn test_cors_header_on_report() {
        let pipeline = pipeline(Arc::new(FlakySink::default()));
        let app = router(&pipeline, Arc::new(NoEnrichment));

        let response = app
            .oneshot(
                Request::post("/api/v1/report")
                    .header("origin", "https://player.example")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_health_and_status() {
        let pipeline = pipeline(Arc::new(FlakySink::default()));
        let app = router(&pipeline, Arc::new(NoEnrichment));

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "OK");

        let response = app
            .oneshot(Request::get("/api/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(status["pipeline"]["reports_accepted"], 0);
        assert!(status["version"].is_string());
    }
}

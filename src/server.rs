//! Web server module for the exporter.
//!
//! Serves the Prometheus scrape endpoint, liveness/readiness probes and a
//! JSON view of the last scrape iteration.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::exporter::{IterationReport, StatusHandle};
use crate::exposition::GaugeRegistry;

/// Content type of the Prometheus text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gauges: GaugeRegistry,
    pub status: StatusHandle,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    iteration: Option<u64>,
}

/// Last iteration summary.
#[derive(Serialize)]
struct CollectorsResponse {
    ready: bool,
    #[serde(flatten)]
    report: Option<IterationReport>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/api/collectors", get(collectors_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .with_state(app_state)
}

/// Prometheus scrape endpoint.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.gauges.render() {
        Ok(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
    }
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        iteration: None,
    })
}

/// Readiness probe: ready once one iteration has completed.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.status.latest().await {
        Some(report) => Json(HealthResponse {
            status: "ok".to_string(),
            iteration: Some(report.iteration),
        })
        .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "not_ready".to_string(),
                iteration: None,
            }),
        )
            .into_response(),
    }
}

/// Resolved collectors and errors of the last iteration.
async fn collectors_handler(State(state): State<Arc<AppState>>) -> Json<CollectorsResponse> {
    let report = state.status.latest().await;
    Json(CollectorsResponse {
        ready: report.is_some(),
        report,
    })
}

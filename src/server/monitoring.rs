//! `/health` and `/metrics`

use std::sync::{Arc, OnceLock};

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::warn;

use super::AppState;

/// Handle used to render the Prometheus exposition
#[cfg(feature = "metrics")]
pub type MetricsHandle = metrics_exporter_prometheus::PrometheusHandle;

/// Placeholder when the exporter is compiled out
#[cfg(not(feature = "metrics"))]
#[derive(Debug, Clone)]
pub struct MetricsHandle;

#[cfg(not(feature = "metrics"))]
impl MetricsHandle {
    fn run_upkeep(&self) {}

    fn render(&self) -> String {
        String::new()
    }
}

static RECORDER: OnceLock<Option<MetricsHandle>> = OnceLock::new();

/// Install the process-wide metrics recorder once and return its handle.
///
/// Returns `None` when another recorder is already installed or the
/// exporter is compiled out.
pub fn install_recorder() -> Option<MetricsHandle> {
    RECORDER.get_or_init(build_recorder).clone()
}

#[cfg(feature = "metrics")]
fn build_recorder() -> Option<MetricsHandle> {
    match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Failed to install metrics recorder, /metrics disabled");
            None
        }
    }
}

#[cfg(not(feature = "metrics"))]
fn build_recorder() -> Option<MetricsHandle> {
    warn!("Built without the metrics feature, /metrics disabled");
    None
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    record_request("GET", "/health");

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "datasources_configured": state.tools.registry().len(),
        "auth_mode": state.auth.mode,
        "auth_method": state.authenticator.method(),
        "auth_cache_size": state.authenticator.cache().size(),
    }))
}

/// Prometheus text exposition
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    record_request("GET", "/metrics");

    let Some(handle) = state.metrics.as_ref() else {
        return (StatusCode::NOT_FOUND, "metrics exporter disabled\n").into_response();
    };
    handle.run_upkeep();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response()
}

pub(crate) fn record_request(method: &'static str, endpoint: &'static str) {
    telemetry_metrics::counter!(
        "proms_mcp_server_requests_total",
        "method" => method,
        "endpoint" => endpoint
    )
    .increment(1);
}

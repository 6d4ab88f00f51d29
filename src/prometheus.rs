//! Prometheus HTTP API client

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::datasource::Datasource;
use crate::{Error, Result};

/// Longest PromQL expression accepted
pub const MAX_QUERY_LENGTH: usize = 10_000;

/// Failure of a single Prometheus call, rendered with a stable prefix
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrometheusError {
    /// Rejected by local validation or by Prometheus with HTTP 400
    #[error("INVALID_QUERY: {0}")]
    InvalidQuery(String),
    /// Prometheus answered 401
    #[error("AUTHENTICATION_FAILED: Invalid credentials")]
    AuthenticationFailed,
    /// Any other HTTP, transport, or decode failure
    #[error("PROMETHEUS_UNAVAILABLE: {0}")]
    Unavailable(String),
    /// The query exceeded the configured timeout
    #[error("TIMEOUT: Query timed out")]
    Timeout,
}

impl PrometheusError {
    fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::AuthenticationFailed,
            StatusCode::BAD_REQUEST => Self::InvalidQuery(body),
            other => Self::Unavailable(format!("HTTP {}", other.as_u16())),
        }
    }

    fn from_transport(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}

/// Reject empty or oversized PromQL before it leaves the process
pub fn validate_promql(query: &str) -> std::result::Result<(), PrometheusError> {
    if query.trim().is_empty() {
        return Err(PrometheusError::InvalidQuery(
            "Query cannot be empty".to_string(),
        ));
    }
    if query.chars().count() > MAX_QUERY_LENGTH {
        return Err(PrometheusError::InvalidQuery(format!(
            "Query too long (max {MAX_QUERY_LENGTH} characters)"
        )));
    }
    Ok(())
}

/// Client bound to one datasource
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    datasource: Datasource,
    http: reqwest::Client,
    timeout: Duration,
}

impl PrometheusClient {
    /// Build a client sending the datasource's auth header on every request
    pub fn new(datasource: &Datasource, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some((name, value)) = datasource.auth_header() {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                Error::Datasource(format!("{}: invalid header name: {e}", datasource.name))
            })?;
            let mut value = HeaderValue::from_str(value).map_err(|e| {
                Error::Datasource(format!("{}: invalid header value: {e}", datasource.name))
            })?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .user_agent(concat!("proms-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            datasource: datasource.clone(),
            http,
            timeout,
        })
    }

    /// Datasource this client talks to
    #[must_use]
    pub fn datasource(&self) -> &Datasource {
        &self.datasource
    }

    /// `GET /api/v1/query`
    pub async fn query_instant(
        &self,
        promql: &str,
        time: Option<&str>,
    ) -> std::result::Result<Value, PrometheusError> {
        validate_promql(promql).inspect_err(|e| self.log_invalid(promql, e))?;
        let mut params = vec![("query", promql)];
        if let Some(time) = time {
            params.push(("time", time));
        }
        self.get("query_instant", "/api/v1/query", &params).await
    }

    /// `GET /api/v1/query_range`
    pub async fn query_range(
        &self,
        promql: &str,
        start: &str,
        end: &str,
        step: &str,
    ) -> std::result::Result<Value, PrometheusError> {
        validate_promql(promql).inspect_err(|e| self.log_invalid(promql, e))?;
        let params = [
            ("query", promql),
            ("start", start),
            ("end", end),
            ("step", step),
        ];
        self.get("query_range", "/api/v1/query_range", &params).await
    }

    /// `GET /api/v1/label/__name__/values`
    pub async fn metric_names(&self) -> std::result::Result<Value, PrometheusError> {
        self.get("metric_names", "/api/v1/label/__name__/values", &[])
            .await
    }

    /// `GET /api/v1/metadata?metric=`
    pub async fn metric_metadata(
        &self,
        metric: &str,
    ) -> std::result::Result<Value, PrometheusError> {
        self.get("metric_metadata", "/api/v1/metadata", &[("metric", metric)])
            .await
    }

    /// `GET /api/v1/series?match[]=`
    pub async fn series(&self, selector: &str) -> std::result::Result<Value, PrometheusError> {
        self.get("series", "/api/v1/series", &[("match[]", selector)])
            .await
    }

    /// `GET /api/v1/label/{label}/values`
    pub async fn label_values(&self, label: &str) -> std::result::Result<Value, PrometheusError> {
        if !is_label_name(label) {
            return Err(PrometheusError::InvalidQuery(format!(
                "Invalid label name: {label}"
            )));
        }
        self.get(
            "label_values",
            &format!("/api/v1/label/{label}/values"),
            &[],
        )
        .await
    }

    async fn get(
        &self,
        operation: &'static str,
        path: &str,
        params: &[(&str, &str)],
    ) -> std::result::Result<Value, PrometheusError> {
        let correlation_id = Uuid::new_v4();
        let url = format!("{}{path}", self.datasource.url);
        let query_preview = params
            .iter()
            .find(|(k, _)| *k == "query")
            .map(|(_, q)| preview(q, 100));

        info!(
            %correlation_id,
            operation,
            datasource = %self.datasource.name,
            query_preview = query_preview.as_deref(),
            has_auth_header = self.datasource.auth_header().is_some(),
            timeout_seconds = self.timeout.as_secs(),
            "Prometheus API call started"
        );

        let start = Instant::now();
        let result = self.send(&url, params).await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(_) => info!(
                %correlation_id,
                operation,
                datasource = %self.datasource.name,
                duration_ms,
                "Prometheus API call completed"
            ),
            Err(e) => error!(
                %correlation_id,
                operation,
                datasource = %self.datasource.name,
                duration_ms,
                error = %e,
                "Prometheus API call failed"
            ),
        }
        result
    }

    async fn send(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> std::result::Result<Value, PrometheusError> {
        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| PrometheusError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PrometheusError::from_status(status, body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| PrometheusError::from_transport(&e))
    }

    fn log_invalid(&self, promql: &str, e: &PrometheusError) {
        warn!(
            datasource = %self.datasource.name,
            query_preview = %preview(promql, 100),
            error = %e,
            "Query validation failed"
        );
    }
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`
fn is_label_name(label: &str) -> bool {
    let mut chars = label.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn preview(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

//! Shared helpers for integration tests

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use proms_mcp::config::{AuthMode, Config, VerificationMethod};
use serde_json::Value;
use tempfile::NamedTempFile;
use tower::ServiceExt;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Config with active auth against `api_url` and no datasources
pub fn active_config(api_url: &str, method: VerificationMethod) -> Config {
    let mut config = Config::default();
    config.auth.mode = AuthMode::Active;
    config.auth.method = method;
    config.auth.api_url = Some(api_url.to_string());
    config.prometheus.datasources_path = PathBuf::from("/nonexistent/datasources.yaml");
    config
}

/// Config with auth disabled
pub fn noauth_config() -> Config {
    let mut config = Config::default();
    config.auth.mode = AuthMode::None;
    config.prometheus.datasources_path = PathBuf::from("/nonexistent/datasources.yaml");
    config
}

/// Write a provisioning file with one Prometheus datasource named `prod`
pub fn datasources_file(prometheus_url: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "apiVersion: 1\ndatasources:\n  - name: prod\n    type: prometheus\n    url: {prometheus_url}\n"
    )
    .unwrap();
    file
}

/// JSON-RPC request to `/mcp`
pub fn mcp_request(token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::post("/mcp").header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Drive the router once and decode the JSON body (`Null` when empty)
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

/// Collects events so tests can assert on log severity
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<(Level, String)>>>);

impl CapturedLogs {
    /// Messages logged at exactly `level`
    pub fn at(&self, level: Level) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Whether any captured line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.0.lock().unwrap().iter().any(|(_, m)| m.contains(needle))
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.insert_str(0, &format!("{value:?}"));
        } else {
            self.0.push_str(&format!(" {}={value:?}", field.name()));
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.0
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0));
    }
}

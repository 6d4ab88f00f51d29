//! MCP tools over the configured Prometheus datasources
//!
//! Every tool answers with a JSON envelope:
//!
//! ```json
//! {"status": "success", "data": ..., "datasource": "prod", "query": "up", "timestamp": "..."}
//! {"status": "error", "error": "Datasource not found: nope", "timestamp": "..."}
//! ```
//!
//! Backend failures are reported in the envelope, never as JSON-RPC errors.
//! Only an unknown tool or malformed arguments produce a JSON-RPC error.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{error, info};

use crate::auth::Identity;
use crate::datasource::DatasourceRegistry;
use crate::error::rpc_codes;
use crate::prometheus::{PrometheusClient, PrometheusError};
use crate::protocol::Tool;
use crate::{Error, Result};

/// The tools this server exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// List configured datasources
    ListDatasources,
    /// All metric names of a datasource
    ListMetrics,
    /// Metadata for one metric
    GetMetricMetadata,
    /// Instant PromQL query
    QueryInstant,
    /// Range PromQL query
    QueryRange,
    /// Label names present on a metric's series
    GetMetricLabels,
    /// Values of one label
    GetLabelValues,
    /// Metric names matching a regex
    FindMetricsByPattern,
}

impl ToolKind {
    /// All tools, in advertisement order
    pub const ALL: [Self; 8] = [
        Self::ListDatasources,
        Self::ListMetrics,
        Self::GetMetricMetadata,
        Self::QueryInstant,
        Self::QueryRange,
        Self::GetMetricLabels,
        Self::GetLabelValues,
        Self::FindMetricsByPattern,
    ];

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListDatasources => "list_datasources",
            Self::ListMetrics => "list_metrics",
            Self::GetMetricMetadata => "get_metric_metadata",
            Self::QueryInstant => "query_instant",
            Self::QueryRange => "query_range",
            Self::GetMetricLabels => "get_metric_labels",
            Self::GetLabelValues => "get_label_values",
            Self::FindMetricsByPattern => "find_metrics_by_pattern",
        }
    }

    /// Look up a tool by wire name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    fn definition(self) -> Tool {
        let ds = json!({"type": "string", "description": "ID of the Prometheus datasource"});
        let (description, schema) = match self {
            Self::ListDatasources => (
                "List all available Prometheus datasources.",
                json!({"type": "object", "properties": {}}),
            ),
            Self::ListMetrics => (
                "Get all available metric names from a datasource.",
                json!({
                    "type": "object",
                    "properties": {"datasource_id": ds},
                    "required": ["datasource_id"]
                }),
            ),
            Self::GetMetricMetadata => (
                "Get metadata (type, help, unit) for a specific metric.",
                json!({
                    "type": "object",
                    "properties": {
                        "datasource_id": ds,
                        "metric_name": {"type": "string", "description": "Metric name"}
                    },
                    "required": ["datasource_id", "metric_name"]
                }),
            ),
            Self::QueryInstant => (
                "Execute an instant PromQL query. Check the current date and time before \
                 passing an explicit evaluation time.",
                json!({
                    "type": "object",
                    "properties": {
                        "datasource_id": ds,
                        "promql": {"type": "string", "description": "PromQL expression"},
                        "time": {"type": "string", "description": "RFC 3339 or Unix timestamp"}
                    },
                    "required": ["datasource_id", "promql"]
                }),
            ),
            Self::QueryRange => (
                "Execute a range PromQL query. Check the current date and time when choosing \
                 start and end.",
                json!({
                    "type": "object",
                    "properties": {
                        "datasource_id": ds,
                        "promql": {"type": "string", "description": "PromQL expression"},
                        "start": {"type": "string", "description": "RFC 3339 or Unix timestamp"},
                        "end": {"type": "string", "description": "RFC 3339 or Unix timestamp"},
                        "step": {"type": "string", "description": "Resolution step, e.g. 30s, 5m"}
                    },
                    "required": ["datasource_id", "promql", "start", "end", "step"]
                }),
            ),
            Self::GetMetricLabels => (
                "Get all label names for a specific metric.",
                json!({
                    "type": "object",
                    "properties": {
                        "datasource_id": ds,
                        "metric_name": {"type": "string", "description": "Metric name"}
                    },
                    "required": ["datasource_id", "metric_name"]
                }),
            ),
            Self::GetLabelValues => (
                "Get all values for a specific label.",
                json!({
                    "type": "object",
                    "properties": {
                        "datasource_id": ds,
                        "label_name": {"type": "string", "description": "Label name"}
                    },
                    "required": ["datasource_id", "label_name"]
                }),
            ),
            Self::FindMetricsByPattern => (
                "Find metric names matching a regular expression.",
                json!({
                    "type": "object",
                    "properties": {
                        "datasource_id": ds,
                        "pattern": {"type": "string", "description": "Regex matched against metric names"}
                    },
                    "required": ["datasource_id", "pattern"]
                }),
            ),
        };
        Tool::read_only(self.as_str(), description, schema)
    }
}

#[derive(Deserialize)]
struct DatasourceArgs {
    datasource_id: String,
}

#[derive(Deserialize)]
struct MetricArgs {
    datasource_id: String,
    metric_name: String,
}

#[derive(Deserialize)]
struct InstantArgs {
    datasource_id: String,
    promql: String,
    #[serde(default)]
    time: Option<String>,
}

#[derive(Deserialize)]
struct RangeArgs {
    datasource_id: String,
    promql: String,
    start: String,
    end: String,
    step: String,
}

#[derive(Deserialize)]
struct LabelArgs {
    datasource_id: String,
    label_name: String,
}

#[derive(Deserialize)]
struct PatternArgs {
    datasource_id: String,
    pattern: String,
}

fn parse_args<T: DeserializeOwned>(tool: ToolKind, arguments: &Value) -> Result<T> {
    let arguments = if arguments.is_null() {
        Value::Object(Map::new())
    } else {
        arguments.clone()
    };
    serde_json::from_value(arguments)
        .map_err(|e| Error::InvalidParams(format!("{}: {e}", tool.as_str())))
}

/// Result envelope builder
#[derive(Debug, Default)]
struct Envelope<'a> {
    datasource: Option<&'a str>,
    query: Option<&'a str>,
}

impl<'a> Envelope<'a> {
    fn for_datasource(datasource: &'a str) -> Self {
        Self {
            datasource: Some(datasource),
            query: None,
        }
    }

    fn with_query(mut self, query: &'a str) -> Self {
        self.query = Some(query);
        self
    }

    fn success(&self, data: Value) -> Value {
        self.finish("success", "data", data)
    }

    fn failure(&self, error: impl std::fmt::Display) -> Value {
        self.finish("error", "error", Value::String(error.to_string()))
    }

    fn finish(&self, status: &str, key: &str, payload: Value) -> Value {
        let mut out = Map::new();
        out.insert("status".into(), Value::from(status));
        out.insert(key.into(), payload);
        if let Some(ds) = self.datasource {
            out.insert("datasource".into(), Value::from(ds));
        }
        if let Some(q) = self.query {
            out.insert("query".into(), Value::from(q));
        }
        out.insert(
            "timestamp".into(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        Value::Object(out)
    }
}

/// Executes tool calls against the datasource registry
pub struct ToolHandler {
    registry: Arc<DatasourceRegistry>,
    clients: HashMap<String, PrometheusClient>,
}

impl ToolHandler {
    /// Build one Prometheus client per datasource.
    ///
    /// A datasource whose client cannot be built (e.g. an invalid header) is
    /// logged and reported as unavailable by every tool.
    pub fn new(registry: Arc<DatasourceRegistry>, query_timeout: Duration) -> Self {
        let mut clients = HashMap::new();
        for ds in registry.iter() {
            match PrometheusClient::new(ds, query_timeout) {
                Ok(client) => {
                    clients.insert(ds.name.clone(), client);
                }
                Err(e) => error!(datasource = %ds.name, error = %e, "Failed to build Prometheus client"),
            }
        }
        Self { registry, clients }
    }

    /// Tool definitions for `tools/list`
    #[must_use]
    pub fn tools() -> Vec<Tool> {
        ToolKind::ALL.into_iter().map(ToolKind::definition).collect()
    }

    /// Datasource registry
    #[must_use]
    pub fn registry(&self) -> &DatasourceRegistry {
        &self.registry
    }

    /// Run a tool, logging and recording metrics for the call.
    ///
    /// Returns the result envelope, or an error for an unknown tool or
    /// invalid arguments.
    pub async fn call(
        &self,
        name: &str,
        arguments: &Value,
        caller: Option<&Identity>,
    ) -> Result<Value> {
        let tool = ToolKind::from_name(name).ok_or_else(|| {
            Error::json_rpc(rpc_codes::METHOD_NOT_FOUND, format!("Unknown tool: {name}"))
        })?;
        let datasource = arguments
            .get("datasource_id")
            .and_then(Value::as_str)
            .unwrap_or("N/A");
        let user = caller.map_or("anonymous", |c| c.username.as_str());

        info!(tool = tool.as_str(), datasource, user, "MCP tool called");
        let start = Instant::now();

        let result = self.dispatch(tool, arguments).await;

        let elapsed = start.elapsed();
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let status = match &result {
            Ok(envelope) if envelope["status"] == "success" => "success",
            _ => "error",
        };

        match &result {
            Ok(_) if status == "success" => {
                info!(tool = tool.as_str(), datasource, user, duration_ms, status, "MCP tool completed");
            }
            Ok(envelope) => error!(
                tool = tool.as_str(),
                datasource,
                user,
                duration_ms,
                status,
                error = envelope["error"].as_str().unwrap_or_default(),
                "MCP tool failed"
            ),
            Err(e) => error!(
                tool = tool.as_str(),
                datasource,
                user,
                duration_ms,
                status,
                error = %e,
                "MCP tool failed"
            ),
        }

        telemetry_metrics::counter!(
            "proms_mcp_tool_requests_total",
            "tool" => tool.as_str(),
            "status" => status
        )
        .increment(1);
        telemetry_metrics::histogram!(
            "proms_mcp_tool_request_duration_seconds",
            "tool" => tool.as_str()
        )
        .record(elapsed.as_secs_f64());

        result
    }

    async fn dispatch(&self, tool: ToolKind, arguments: &Value) -> Result<Value> {
        match tool {
            ToolKind::ListDatasources => Ok(self.list_datasources()),
            ToolKind::ListMetrics => {
                let args: DatasourceArgs = parse_args(tool, arguments)?;
                let envelope = Envelope::for_datasource(&args.datasource_id);
                Ok(self
                    .with_client(&envelope, &args.datasource_id, |c| async move {
                        c.metric_names().await.map(|body| body["data"].clone())
                    })
                    .await)
            }
            ToolKind::GetMetricMetadata => {
                let args: MetricArgs = parse_args(tool, arguments)?;
                let envelope = Envelope::for_datasource(&args.datasource_id);
                let metric = args.metric_name.as_str();
                Ok(self
                    .with_client(&envelope, &args.datasource_id, |c| async move {
                        c.metric_metadata(metric).await.map(|body| body["data"].clone())
                    })
                    .await)
            }
            ToolKind::QueryInstant => {
                let args: InstantArgs = parse_args(tool, arguments)?;
                let envelope =
                    Envelope::for_datasource(&args.datasource_id).with_query(&args.promql);
                let (promql, time) = (args.promql.as_str(), args.time.as_deref());
                Ok(self
                    .with_client(&envelope, &args.datasource_id, |c| async move {
                        c.query_instant(promql, time).await.map(|body| body["data"].clone())
                    })
                    .await)
            }
            ToolKind::QueryRange => {
                let args: RangeArgs = parse_args(tool, arguments)?;
                let envelope =
                    Envelope::for_datasource(&args.datasource_id).with_query(&args.promql);
                let args = &args;
                Ok(self
                    .with_client(&envelope, &args.datasource_id, |c| async move {
                        c.query_range(&args.promql, &args.start, &args.end, &args.step)
                            .await
                            .map(|body| body["data"].clone())
                    })
                    .await)
            }
            ToolKind::GetMetricLabels => {
                let args: MetricArgs = parse_args(tool, arguments)?;
                let envelope = Envelope::for_datasource(&args.datasource_id);
                let metric = args.metric_name.as_str();
                Ok(self
                    .with_client(&envelope, &args.datasource_id, |c| async move {
                        c.series(metric).await.map(|body| label_names(&body["data"]))
                    })
                    .await)
            }
            ToolKind::GetLabelValues => {
                let args: LabelArgs = parse_args(tool, arguments)?;
                let envelope = Envelope::for_datasource(&args.datasource_id);
                let label = args.label_name.as_str();
                Ok(self
                    .with_client(&envelope, &args.datasource_id, |c| async move {
                        c.label_values(label).await.map(|body| body["data"].clone())
                    })
                    .await)
            }
            ToolKind::FindMetricsByPattern => {
                let args: PatternArgs = parse_args(tool, arguments)?;
                let envelope = Envelope::for_datasource(&args.datasource_id);
                if self.registry.get(&args.datasource_id).is_none() {
                    return Ok(envelope
                        .failure(format!("Datasource not found: {}", args.datasource_id)));
                }
                let regex = match Regex::new(&args.pattern) {
                    Ok(re) => re,
                    Err(e) => {
                        return Ok(envelope.failure(format!("Invalid regex pattern: {e}")));
                    }
                };
                let regex = &regex;
                Ok(self
                    .with_client(&envelope, &args.datasource_id, |c| async move {
                        c.metric_names()
                            .await
                            .map(|body| filter_names(&body["data"], regex))
                    })
                    .await)
            }
        }
    }

    fn list_datasources(&self) -> Value {
        let data: Vec<Value> = self
            .registry
            .iter()
            .map(|ds| {
                json!({
                    "id": ds.name,
                    "name": ds.name,
                    "url": ds.url,
                    "type": "prometheus"
                })
            })
            .collect();
        Envelope::default().success(Value::Array(data))
    }

    /// Resolve the datasource client and wrap the outcome in an envelope
    async fn with_client<'c, F, Fut>(
        &'c self,
        envelope: &Envelope<'_>,
        datasource_id: &str,
        f: F,
    ) -> Value
    where
        F: FnOnce(&'c PrometheusClient) -> Fut,
        Fut: Future<Output = std::result::Result<Value, PrometheusError>>,
    {
        if self.registry.get(datasource_id).is_none() {
            return envelope.failure(format!("Datasource not found: {datasource_id}"));
        }
        let Some(client) = self.clients.get(datasource_id) else {
            return envelope.failure(PrometheusError::Unavailable(format!(
                "datasource {datasource_id} is misconfigured"
            )));
        };
        match f(client).await {
            Ok(data) => envelope.success(data),
            Err(e) => envelope.failure(e),
        }
    }
}

/// Unique label names across series, without `__name__`
fn label_names(series: &Value) -> Value {
    let names: BTreeSet<&str> = series
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .flat_map(|labels| labels.keys().map(String::as_str))
        .filter(|name| *name != "__name__")
        .collect();
    json!(names)
}

fn filter_names(names: &Value, regex: &Regex) -> Value {
    let matching: Vec<&str> = names
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter(|name| regex.is_match(name))
        .collect();
    json!(matching)
}

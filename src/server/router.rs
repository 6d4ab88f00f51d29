//! HTTP router and the JSON-RPC handler for `POST /mcp`

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, warn};

use super::AppState;
use super::gate::auth_gate;
use super::monitoring::{health_handler, metrics_handler, record_request};
use crate::auth::{AccessGrant, Identity, READ_SCOPE};
use crate::error::rpc_codes;
use crate::protocol::{
    Info, InitializeResult, JsonRpcResponse, RequestId, ServerCapabilities, ToolsCallParams,
    ToolsCallResult, ToolsCapability, ToolsListResult, negotiate_version,
};
use crate::tools::ToolHandler;

const INSTRUCTIONS: &str = "Read-only access to Prometheus. Call list_datasources first, \
     then discover metrics with list_metrics or find_metrics_by_pattern before querying.";

/// Create the main router: MCP endpoint plus monitoring, behind the gate
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mcp", post(mcp_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), auth_gate))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router for the dedicated health port: monitoring only, no gate
pub fn create_health_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// MCP handler (POST /mcp)
async fn mcp_handler(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    record_request("POST", "/mcp");

    let identity = request.extensions().get::<Identity>().cloned();
    let grant = request.extensions().get::<AccessGrant>().cloned();

    let body = match axum::body::to_bytes(request.into_body(), state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return rpc_reply(
                StatusCode::BAD_REQUEST,
                JsonRpcResponse::error(None, rpc_codes::PARSE_ERROR, format!("Failed to read body: {e}")),
            );
        }
    };

    let value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return rpc_reply(
                StatusCode::BAD_REQUEST,
                JsonRpcResponse::error(None, rpc_codes::PARSE_ERROR, format!("Invalid JSON: {e}")),
            );
        }
    };

    let (id, method, params) = match parse_request(&value) {
        Ok(parsed) => parsed,
        Err(response) => return rpc_reply(StatusCode::BAD_REQUEST, response),
    };

    let Some(id) = id else {
        debug!(method = %method, "Notification received");
        return StatusCode::ACCEPTED.into_response();
    };

    let response = match method.as_str() {
        "initialize" => initialize(id, params.as_ref()),
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => JsonRpcResponse::success(
            id,
            json!(ToolsListResult {
                tools: ToolHandler::tools()
            }),
        ),
        "tools/call" => {
            call_tool(&state, id, params, identity.as_ref(), grant.as_ref()).await
        }
        other => JsonRpcResponse::method_not_found(Some(id), other),
    };

    rpc_reply(StatusCode::OK, response)
}

fn initialize(id: RequestId, params: Option<&Value>) -> JsonRpcResponse {
    let requested = params
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str);
    let result = InitializeResult {
        protocol_version: negotiate_version(requested).to_string(),
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability { list_changed: false }),
        },
        server_info: Info {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        instructions: Some(INSTRUCTIONS.to_string()),
    };
    JsonRpcResponse::success(id, json!(result))
}

async fn call_tool(
    state: &AppState,
    id: RequestId,
    params: Option<Value>,
    identity: Option<&Identity>,
    grant: Option<&AccessGrant>,
) -> JsonRpcResponse {
    let authorized = grant.is_some_and(|g| g.has_scope(READ_SCOPE) && !g.is_expired());
    if !authorized {
        warn!(
            user = identity.map_or("anonymous", |i| i.username.as_str()),
            "Tool call without a valid read grant"
        );
        return JsonRpcResponse::error(
            Some(id),
            rpc_codes::SERVER_ERROR_START,
            format!("Insufficient scope: {READ_SCOPE} required"),
        );
    }

    let Some(params) = params else {
        return JsonRpcResponse::error(Some(id), rpc_codes::INVALID_PARAMS, "Missing params");
    };
    let params: ToolsCallParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => {
            return JsonRpcResponse::error(
                Some(id),
                rpc_codes::INVALID_PARAMS,
                format!("Invalid tools/call params: {e}"),
            );
        }
    };

    match state.tools.call(&params.name, &params.arguments, identity).await {
        Ok(envelope) => {
            let is_error = envelope["status"] == "error";
            JsonRpcResponse::success(id, json!(ToolsCallResult::json(&envelope, is_error)))
        }
        Err(e) => JsonRpcResponse::error(Some(id), e.to_rpc_code(), e.to_string()),
    }
}

fn rpc_reply(status: StatusCode, response: JsonRpcResponse) -> Response {
    (status, Json(response)).into_response()
}

/// Extract a `RequestId` from a JSON value.
///
/// Supports string and integer ids; anything else is treated as absent.
fn extract_request_id(value: &Value) -> Option<RequestId> {
    match value {
        Value::String(s) => Some(RequestId::String(s.clone())),
        Value::Number(n) => n.as_i64().map(RequestId::Number),
        _ => None,
    }
}

fn is_notification_method(method: &str) -> bool {
    method.starts_with("notifications/")
}

/// Parse a JSON-RPC request or notification.
///
/// Returns `(id, method, params)`; `id` is `None` only for notifications.
#[allow(clippy::result_large_err)]
fn parse_request(
    value: &Value,
) -> Result<(Option<RequestId>, String, Option<Value>), JsonRpcResponse> {
    if value.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(JsonRpcResponse::error(
            None,
            rpc_codes::INVALID_REQUEST,
            "Invalid JSON-RPC version",
        ));
    }

    let id = value.get("id").and_then(extract_request_id);

    let method = value
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            JsonRpcResponse::error(id.clone(), rpc_codes::INVALID_REQUEST, "Missing method")
        })?;

    if is_notification_method(method) {
        return Ok((None, method.to_string(), None));
    }
    if id.is_none() {
        return Err(JsonRpcResponse::error(None, rpc_codes::INVALID_REQUEST, "Missing id"));
    }

    Ok((id, method.to_string(), value.get("params").cloned()))
}

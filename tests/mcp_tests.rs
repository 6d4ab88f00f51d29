//! MCP endpoint tests against a mocked Prometheus

mod common;

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use proms_mcp::server::Server;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{datasources_file, mcp_request, noauth_config, send};

fn call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

/// Decode the envelope carried as text content
fn envelope(body: &Value) -> Value {
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn initialize_and_list_tools() {
    let server = Server::new(noauth_config()).unwrap();

    let init = json!({
        "jsonrpc": "2.0", "id": "init-1", "method": "initialize",
        "params": {"protocolVersion": "2024-11-05", "capabilities": {}}
    });
    let (status, body) = send(server.router(), mcp_request(None, &init)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "init-1");
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");

    let list = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});
    let (_, body) = send(server.router(), mcp_request(None, &list)).await;
    let names: Vec<&str> = body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "list_datasources",
            "list_metrics",
            "get_metric_metadata",
            "query_instant",
            "query_range",
            "get_metric_labels",
            "get_label_values",
            "find_metrics_by_pattern",
        ]
    );
    assert_eq!(body["result"]["tools"][0]["annotations"]["readOnlyHint"], true);
}

#[tokio::test]
async fn notification_is_accepted_without_body() {
    let server = Server::new(noauth_config()).unwrap();
    let note = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
    let (status, body) = send(server.router(), mcp_request(None, &note)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn protocol_errors() {
    let server = Server::new(noauth_config()).unwrap();

    let request = axum::http::Request::post("/mcp")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let (status, body) = send(server.router(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32700);

    let unknown = json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"});
    let (_, body) = send(server.router(), mcp_request(None, &unknown)).await;
    assert_eq!(body["error"]["code"], -32601);

    let (_, body) = send(server.router(), mcp_request(None, &call(2, "drop_all", json!({})))).await;
    assert_eq!(body["error"]["code"], -32601);

    let (_, body) = send(
        server.router(),
        mcp_request(None, &call(3, "query_range", json!({"datasource_id": "prod"}))),
    )
    .await;
    assert_eq!(body["error"]["code"], -32602);
}

#[tokio::test]
async fn query_instant_through_mcp() {
    let prometheus = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .and(query_param("query", "sum(up)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"resultType": "vector", "result": [{"metric": {}, "value": [1, "3"]}]}
        })))
        .expect(1)
        .mount(&prometheus)
        .await;

    let file = datasources_file(&prometheus.uri());
    let mut config = noauth_config();
    config.prometheus.datasources_path = file.path().to_path_buf();
    let server = Server::new(config).unwrap();

    let request = call(1, "query_instant", json!({"datasource_id": "prod", "promql": "sum(up)"}));
    let (status, body) = send(server.router(), mcp_request(None, &request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["isError"], false);

    let env = envelope(&body);
    assert_eq!(env["status"], "success");
    assert_eq!(env["datasource"], "prod");
    assert_eq!(env["query"], "sum(up)");
    assert_eq!(env["data"]["result"][0]["value"][1], "3");
}

#[tokio::test]
async fn unknown_datasource_is_error_envelope() {
    let server = Server::new(noauth_config()).unwrap();
    let request = call(1, "list_metrics", json!({"datasource_id": "missing"}));
    let (_, body) = send(server.router(), mcp_request(None, &request)).await;

    assert_eq!(body["result"]["isError"], true);
    let env = envelope(&body);
    assert_eq!(env["status"], "error");
    assert_eq!(env["error"], "Datasource not found: missing");
}

#[tokio::test]
async fn metric_labels_through_mcp() {
    let prometheus = MockServer::start().await;
    Mock::given(path("/api/v1/series"))
        .and(query_param("match[]", "http_requests_total"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": [
                {"__name__": "http_requests_total", "code": "200", "handler": "/"},
                {"__name__": "http_requests_total", "code": "500", "method": "GET"}
            ]
        })))
        .mount(&prometheus)
        .await;

    let file = datasources_file(&prometheus.uri());
    let mut config = noauth_config();
    config.prometheus.datasources_path = file.path().to_path_buf();
    let server = Server::new(config).unwrap();

    let request = call(
        1,
        "get_metric_labels",
        json!({"datasource_id": "prod", "metric_name": "http_requests_total"}),
    );
    let (_, body) = send(server.router(), mcp_request(None, &request)).await;
    assert_eq!(envelope(&body)["data"], json!(["code", "handler", "method"]));
}

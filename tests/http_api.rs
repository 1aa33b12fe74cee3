//! HTTP API integration tests
//!
//! Serve the router on an ephemeral port and speak plain HTTP/1.1 to it.

mod common;

use common::{
    build_gateway, device_dump, fast_timeouts, mock_gateway, MockOptions, MockScada, DEVICE_ID,
    NODE_ID,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use scada_gateway::{server, Gateway};

async fn serve(gateway: Arc<Gateway>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(gateway, listener));
    addr
}

async fn exchange(addr: SocketAddr, raw_request: String) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw_request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8(raw).unwrap();

    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    let status = head.split_whitespace().nth(1).unwrap().parse().unwrap();
    (status, body.to_string())
}

async fn get(addr: SocketAddr, path: &str) -> (u16, Value) {
    let (status, body) = exchange(
        addr,
        format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path),
    )
    .await;
    (status, serde_json::from_str(&body).unwrap())
}

async fn post(addr: SocketAddr, path: &str, body: &Value) -> (u16, Value) {
    let body = body.to_string();
    let (status, body) = exchange(
        addr,
        format!(
            "POST {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            path,
            body.len(),
            body
        ),
    )
    .await;
    (status, serde_json::from_str(&body).unwrap())
}

#[tokio::test]
async fn test_health_reports_persisted_state() {
    let dir = TempDir::new().unwrap();
    let gateway = build_gateway(dir.path(), "ws://127.0.0.1:1", None, None, fast_timeouts());
    let addr = serve(gateway).await;

    let (status, body) = get(addr, "/api/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connect_state"], "No connection");
    assert!(body["time"].is_string());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let dir = TempDir::new().unwrap();
    let gateway = build_gateway(dir.path(), "ws://127.0.0.1:1", None, None, fast_timeouts());
    let addr = serve(gateway).await;

    let (status, body) = get(addr, "/api/unknown").await;
    assert_eq!(status, 404);
    assert_eq!(body, json!({"error": "Not found"}));
}

#[tokio::test]
async fn test_device_list_without_node_id_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let gateway = build_gateway(dir.path(), "ws://127.0.0.1:1", None, None, fast_timeouts());
    let addr = serve(gateway).await;

    let (status, body) = get(addr, "/api/devx_list").await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("No node id"));
}

#[tokio::test]
async fn test_dump_routes_shape_one_payload() {
    let mock = MockScada::start(MockOptions::default()).await;
    let dir = TempDir::new().unwrap();
    let gateway = mock_gateway(dir.path(), &mock);
    let addr = serve(gateway).await;

    let (status, body) = get(addr, "/api/dump_devm?did=9&node_id=5&id=274").await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({
            "success": true,
            "result": [{"id": 274, "label": "Pressure", "value": 2.1, "unit": "bar"}]
        })
    );

    let (_, names) = get(addr, "/api/dump_devm_param_names?did=9&node_id=5").await;
    assert_eq!(names["params"].as_array().unwrap().len(), 2);

    let (_, alarm) = get(addr, "/api/dump_devm_alarm").await;
    assert_eq!(alarm["alarm"], json!({"code": 3}));

    let (_, leds) = get(addr, "/api/dump_devm_leds").await;
    assert_eq!(leds["leds"], json!([1, 0]));

    assert_eq!(mock.requests_of("dump_devm").len(), 1);
}

#[tokio::test]
async fn test_node_list_and_passthrough() {
    let mock = MockScada::start(MockOptions::default()).await;
    let dir = TempDir::new().unwrap();
    let gateway = mock_gateway(dir.path(), &mock);
    let addr = serve(gateway).await;

    let (status, body) = post(addr, "/api/any", &json!({"Request": "trend_get", "did": 9})).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["Request"], "trend_get");

    let (status, body) = get(addr, "/api/node_list").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["NodeList"][0]["id"], NODE_ID);

    let (status, body) = post(addr, "/api/any", &json!({"did": 9})).await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_passthrough_dump_is_written_to_cache() {
    let mock = MockScada::start(MockOptions::default()).await;
    let dir = TempDir::new().unwrap();
    let gateway = mock_gateway(dir.path(), &mock);
    let addr = serve(gateway).await;

    let request = json!({"Request": "dump_devm", "did": DEVICE_ID, "node_id": NODE_ID});
    let (status, body) = post(addr, "/api/any", &request).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["MSG"]["VALUE"], device_dump()["VALUE"]);

    let path = dir
        .path()
        .join("data")
        .join(format!("dump_devm_{}_{}.json", NODE_ID, DEVICE_ID));
    let cached: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    assert_eq!(cached["VALUE"], device_dump()["VALUE"]);

    // The shaped routes now read the cached dump
    let (status, _) = get(addr, "/api/dump_devm_alarm").await;
    assert_eq!(status, 200);
    assert_eq!(mock.requests_of("dump_devm").len(), 1);
}

#[tokio::test]
async fn test_upstream_unreachable_is_structured_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let dir = TempDir::new().unwrap();
    let gateway = build_gateway(
        dir.path(),
        &format!("ws://{}", dead),
        Some(NODE_ID),
        Some(DEVICE_ID),
        fast_timeouts(),
    );
    let addr = serve(gateway).await;

    let (status, body) = get(addr, "/api/node_list").await;
    assert_eq!(status, 502);
    assert_eq!(body["success"], false);

    let (_, health) = get(addr, "/api/health").await;
    assert_eq!(health["connect_state"], "Error");
}

#[tokio::test]
async fn test_restart_route_acknowledges() {
    let mock = MockScada::start(MockOptions::default()).await;
    let dir = TempDir::new().unwrap();
    let gateway = mock_gateway(dir.path(), &mock);
    let addr = serve(gateway).await;

    let (status, body) = get(addr, "/api/restart").await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({"success": true, "message": "Service restart initiated"})
    );
}

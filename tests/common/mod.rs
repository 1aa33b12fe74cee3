//! In-process SCADA endpoint for integration tests

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use scada_gateway::{
    cache::CacheStore,
    capture::{CaptureSink, NullCapture},
    correlator::Correlator,
    credentials::CredentialStore,
    Gateway, Session, Timeouts,
};

pub const CHALLENGE: &str = "=100; +50; -20; *2; /3; Bitti";
pub const CHALLENGE_ANSWER: i64 = 86;
pub const NODE_ID: u64 = 5;
pub const DEVICE_ID: u64 = 9;

#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    /// Delay before answering a login
    pub login_delay: Duration,
    /// Answer logins without a session identity
    pub reject_login: bool,
    /// Send a duplicate-logon warning right after the challenge
    pub duplicate_logon: bool,
    /// Delay before answering a device dump
    pub dump_delay: Duration,
    /// Answer only this many device list requests
    pub device_list_answers: Option<usize>,
    /// Report nodes without devices
    pub empty_device_list: bool,
}

struct MockState {
    options: MockOptions,
    connections: AtomicUsize,
    logins: AtomicUsize,
    device_lists: AtomicUsize,
    requests: Mutex<Vec<Value>>,
}

pub struct MockScada {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockScada {
    pub async fn start(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState {
            options,
            connections: AtomicUsize::new(0),
            logins: AtomicUsize::new(0),
            device_lists: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        });

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_client(stream, Arc::clone(&accept_state)));
            }
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    /// Requests received with the given discriminator, in arrival order
    pub fn requests_of(&self, kind: &str) -> Vec<Value> {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r["Request"] == kind)
            .cloned()
            .collect()
    }
}

pub fn device_dump() -> Value {
    json!({
        "VALUE": [
            {"A": 293, "N": "Supply temp", "V": 71.5, "U": "C"},
            {"A": 274, "N": "Pressure", "V": 2.1, "U": "bar"},
            {"A": 12, "N": "", "V": 0}
        ],
        "EXTRA": {"Alarm": {"code": 3}, "Leds": [1, 0]}
    })
}

fn text(value: Value) -> Message {
    Message::Text(value.to_string())
}

async fn serve_client(stream: TcpStream, state: Arc<MockState>) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    state.connections.fetch_add(1, Ordering::SeqCst);

    if ws
        .send(text(json!({"Request": "usr_fedai", "fedai": CHALLENGE})))
        .await
        .is_err()
    {
        return;
    }
    if state.options.duplicate_logon {
        let _ = ws
            .send(text(json!({
                "Request": "user_warn",
                "ErrCode": -1010,
                "ErrText": "Multiple Logon Error"
            })))
            .await;
    }

    while let Some(Ok(msg)) = ws.next().await {
        let raw = match msg {
            Message::Text(raw) => raw,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(request) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        state.requests.lock().unwrap().push(request.clone());

        let kind = request["Request"].as_str().unwrap_or_default().to_string();
        let reply = match kind.as_str() {
            "usr_login" => {
                state.logins.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(state.options.login_delay).await;
                if !state.options.reject_login && request["RndNum"] == CHALLENGE_ANSWER {
                    json!({"Request": "usr_login", "UsrIdt": 42})
                } else {
                    json!({"Request": "usr_login"})
                }
            }
            "node_list" => json!({
                "Request": "node_list",
                "NodeList": [{"id": NODE_ID, "name": "Boiler house"}]
            }),
            "devx_list" => {
                let answered = state.device_lists.fetch_add(1, Ordering::SeqCst);
                if state.options.device_list_answers.is_some_and(|n| answered >= n) {
                    continue;
                }
                let devices = if state.options.empty_device_list {
                    json!([])
                } else {
                    json!([{"did": DEVICE_ID, "name": "Controller", "Node": NODE_ID}])
                };
                json!({"Request": "devx_list", "DevxList": devices})
            }
            "devx_pump" => {
                let _ = ws.send(Message::Binary(vec![0xCA, 0xFE])).await;
                continue;
            }
            "dump_devm" => {
                tokio::time::sleep(state.options.dump_delay).await;
                let mut dump = device_dump();
                dump["did"] = request["did"].clone();
                json!({"Request": "dump_devm", "MSG": dump})
            }
            "bye" => {
                let _ = ws.close(None).await;
                break;
            }
            _ => json!({"Request": kind, "echo": request}),
        };

        if ws.send(text(reply)).await.is_err() {
            break;
        }
    }
}

/// Write a credentials file and build the session around it
pub fn build_session(
    dir: &Path,
    url: &str,
    node_id: Option<u64>,
    did: Option<u64>,
    capture: Arc<dyn CaptureSink>,
) -> Arc<Session> {
    build_session_with_ttl(dir, url, node_id, did, capture, None)
}

pub fn build_session_with_ttl(
    dir: &Path,
    url: &str,
    node_id: Option<u64>,
    did: Option<u64>,
    capture: Arc<dyn CaptureSink>,
    ttl: Option<Duration>,
) -> Arc<Session> {
    let path = dir.join("config.json");
    let record = json!({
        "ws_url": url,
        "login": "operator",
        "password": "secret",
        "node_id": node_id.map(Value::from).unwrap_or(json!("")),
        "did": did.map(Value::from).unwrap_or(json!("")),
    });
    std::fs::write(&path, record.to_string()).unwrap();

    let credentials = Arc::new(CredentialStore::load(&path).unwrap());
    let store = Arc::new(CacheStore::open(dir.join("data"), ttl).unwrap());
    Arc::new(Session::new(
        credentials,
        store,
        Arc::new(Correlator::new()),
        capture,
        Duration::from_secs(5),
    ))
}

pub fn build_gateway(
    dir: &Path,
    url: &str,
    node_id: Option<u64>,
    did: Option<u64>,
    timeouts: Timeouts,
) -> Arc<Gateway> {
    build_gateway_with_ttl(dir, url, node_id, did, timeouts, None)
}

pub fn build_gateway_with_ttl(
    dir: &Path,
    url: &str,
    node_id: Option<u64>,
    did: Option<u64>,
    timeouts: Timeouts,
    ttl: Option<Duration>,
) -> Arc<Gateway> {
    let session = build_session_with_ttl(dir, url, node_id, did, Arc::new(NullCapture), ttl);
    Arc::new(Gateway::new(session, timeouts))
}

/// Gateway for the default node and device of the mock
pub fn mock_gateway(dir: &Path, mock: &MockScada) -> Arc<Gateway> {
    build_gateway(dir, &mock.url(), Some(NODE_ID), Some(DEVICE_ID), fast_timeouts())
}

/// Short budgets so failing paths finish quickly
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        challenge: Duration::from_secs(2),
        login: Duration::from_secs(2),
        node_list: Duration::from_secs(2),
        device_list: Duration::from_secs(2),
        request: Duration::from_secs(2),
        restart_delay: Duration::from_millis(50),
    }
}

/// Poll `check` until it holds or five seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

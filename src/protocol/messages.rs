//! Request builders and reply accessors for the SCADA protocol

use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};

use super::codec::Envelope;

/// Discriminators used by the gateway
pub mod kinds {
    pub const CHALLENGE: &str = "usr_fedai";
    pub const LOGIN: &str = "usr_login";
    pub const NODE_LIST: &str = "node_list";
    pub const DEVICE_LIST: &str = "devx_list";
    pub const DEVICE_PUMP: &str = "devx_pump";
    pub const DEVICE_DUMP: &str = "dump_devm";
    pub const WARNING: &str = "user_warn";
}

/// Error code the endpoint uses for a second logon with the same account
pub const DUPLICATE_SESSION_CODE: i64 = -1010;
/// Error text accompanying a second logon with the same account
pub const DUPLICATE_SESSION_TEXT: &str = "Multiple Logon Error";

static LAST_RANDOM: AtomicI64 = AtomicI64::new(0);

/// Strictly increasing login nonce derived from the wall clock.
pub fn next_random() -> i64 {
    let now = chrono::Utc::now().timestamp_millis().saturating_mul(10_000);
    let mut prev = LAST_RANDOM.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev.saturating_add(1));
        match LAST_RANDOM.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

pub fn login_request(login: &str, password: &str, random: i64, response: i64) -> Value {
    json!({
        "Request": kinds::LOGIN,
        "UsrNam": login,
        "UsrPwd": password,
        "ComIdt": -1,
        "AppMod": "V",
        "MsgPrm": "JSON",
        "Random": random,
        "RndNum": response,
    })
}

pub fn node_list_request() -> Value {
    json!({ "Request": kinds::NODE_LIST })
}

pub fn device_list_request(node_id: u64) -> Value {
    json!({ "Request": kinds::DEVICE_LIST, "Node": node_id, "Skip": 0 })
}

pub fn device_pump_request(did: u64) -> Value {
    json!({ "Request": kinds::DEVICE_PUMP, "job": 1, "did": did })
}

pub fn device_dump_request(node_id: u64, did: u64) -> Value {
    json!({ "Request": kinds::DEVICE_DUMP, "did": did, "node_id": node_id })
}

/// Read a numeric identifier that may be encoded as a number or a string
pub fn as_identifier(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Challenge program carried by a `usr_fedai` message
pub fn challenge_program(env: &Envelope) -> Option<&str> {
    env.field("fedai").and_then(Value::as_str)
}

/// Whether a `usr_login` reply carries a session identity
pub fn has_session_identity(env: &Envelope) -> bool {
    env.field("UsrIdt").is_some_and(|v| !v.is_null() && v != &Value::Bool(false))
}

/// Identifier of the first node in a `node_list` reply
pub fn first_node_id(env: &Envelope) -> Option<u64> {
    env.field("NodeList")?
        .as_array()?
        .first()?
        .get("id")
        .and_then(as_identifier)
}

/// Identifier of the first device in a `devx_list` reply
pub fn first_device_id(env: &Envelope) -> Option<u64> {
    env.field("DevxList")?
        .as_array()?
        .first()?
        .get("did")
        .and_then(as_identifier)
}

/// Code and text of a `user_warn` message
pub fn warning_details(env: &Envelope) -> (Option<i64>, String) {
    let code = env.field("ErrCode").and_then(Value::as_i64);
    let text = ["ErrText", "Text", "text"]
        .iter()
        .find_map(|k| env.field(k).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| env.body.to_string());
    (code, text)
}

/// Whether a warning signals that another client logged on with our account
pub fn is_duplicate_session(env: &Envelope) -> bool {
    if !env.is_kind(kinds::WARNING) {
        return false;
    }
    env.field("ErrCode").and_then(Value::as_i64) == Some(DUPLICATE_SESSION_CODE)
        || env.field("ErrText").and_then(Value::as_str) == Some(DUPLICATE_SESSION_TEXT)
}

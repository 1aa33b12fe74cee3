//! Health endpoint
//!
//! Reports the persisted connection state, so it answers even while the
//! upstream session is down.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::json;

use super::json_response;
use crate::gateway::Gateway;

/// `GET /api/health`
pub fn health_check(gateway: &Gateway) -> Response<Full<Bytes>> {
    let report = gateway.health();
    let body = serde_json::to_value(&report)
        .unwrap_or_else(|_| json!({ "status": report.status }));
    json_response(StatusCode::OK, &body)
}

//! `/api/*` resource routes
//!
//! Each route resolves one resource through the gateway and shapes the
//! payload. Identifiers missing from the query fall back to the ones in the
//! credentials record.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::{error_response, json_response};
use crate::cache::ResourceKey;
use crate::gateway::{shaping, Gateway};
use crate::types::{GatewayError, Result};

/// Which view of a device dump a route serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpView {
    Parameters,
    ParameterNames,
    Alarm,
    Leds,
}

/// Decoded query string
#[derive(Debug, Default)]
pub struct Query(Vec<(String, String)>);

impl Query {
    pub fn parse(raw: Option<&str>) -> Self {
        let pairs = raw
            .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
            .unwrap_or_default();
        Self(pairs)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First run of digits in the parameter value
    pub fn identifier(&self, name: &str) -> Option<u64> {
        let value = self.get(name)?;
        let start = value.find(|c: char| c.is_ascii_digit())?;
        let digits: String = value[start..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    }
}

fn respond(outcome: Result<Value>) -> Response<Full<Bytes>> {
    match outcome {
        Ok(body) => json_response(StatusCode::OK, &body),
        Err(e) => {
            debug!("Request failed: {}", e);
            error_response(e)
        }
    }
}

/// `GET /api/node_list`
pub async fn handle_node_list(gateway: Arc<Gateway>) -> Response<Full<Bytes>> {
    respond(
        gateway
            .resolve(ResourceKey::NodeList)
            .await
            .map(|data| json!({ "success": true, "data": data })),
    )
}

/// `GET /api/devx_list?node_id=ID`
pub async fn handle_device_list(gateway: Arc<Gateway>, query: &Query) -> Response<Full<Bytes>> {
    let node_id = query
        .identifier("node_id")
        .or_else(|| gateway.session().credentials().node_id());
    let Some(node_id) = node_id else {
        return error_response(GatewayError::BadRequest("No node id".into()));
    };

    respond(
        gateway
            .resolve(ResourceKey::DeviceList { node_id })
            .await
            .map(|data| json!({ "success": true, "data": data })),
    )
}

/// `GET /api/dump_devm*?did=D&node_id=N`
pub async fn handle_device_dump(
    gateway: Arc<Gateway>,
    query: &Query,
    view: DumpView,
) -> Response<Full<Bytes>> {
    let credentials = gateway.session().credentials().snapshot();
    let did = query.identifier("did").or(credentials.did);
    let node_id = query.identifier("node_id").or(credentials.node_id);

    let (Some(node_id), Some(did)) = (node_id, did) else {
        return error_response(GatewayError::BadRequest("No node id or device id".into()));
    };

    let ids = query.get("id").map(shaping::parse_id_filter);

    respond(
        gateway
            .resolve(ResourceKey::DeviceDump { node_id, did })
            .await
            .map(|payload| match view {
                DumpView::Parameters => json!({
                    "success": true,
                    "result": shaping::parameters(&payload, ids.as_deref()),
                }),
                DumpView::ParameterNames => json!({
                    "success": true,
                    "params": shaping::parameter_names(&payload),
                }),
                DumpView::Alarm => json!({ "success": true, "alarm": shaping::alarm(&payload) }),
                DumpView::Leds => json!({ "success": true, "leds": shaping::leds(&payload) }),
            }),
    )
}

/// `POST /api/any` with a raw protocol request as body
pub async fn handle_any(gateway: Arc<Gateway>, body: &[u8]) -> Response<Full<Bytes>> {
    let request: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => return error_response(e.into()),
    };

    respond(
        gateway
            .passthrough(request)
            .await
            .map(|data| json!({ "success": true, "data": data })),
    )
}

/// `GET /api/restart`
pub fn handle_restart(gateway: Arc<Gateway>) -> Response<Full<Bytes>> {
    gateway.restart();
    json_response(
        StatusCode::OK,
        &json!({ "success": true, "message": "Service restart initiated" }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_takes_first_digit_run() {
        let query = Query::parse(Some("did=abc17693xyz42&node_id=12345&id=293,274"));
        assert_eq!(query.identifier("did"), Some(17693));
        assert_eq!(query.identifier("node_id"), Some(12345));
        assert_eq!(query.get("id"), Some("293,274"));
    }

    #[test]
    fn test_identifier_missing_or_unparsable() {
        let query = Query::parse(Some("did=none&node_id="));
        assert_eq!(query.identifier("did"), None);
        assert_eq!(query.identifier("node_id"), None);
        assert_eq!(Query::parse(None).identifier("did"), None);
    }

    #[test]
    fn test_query_decodes_percent_escapes() {
        let query = Query::parse(Some("id=1%2C2"));
        assert_eq!(query.get("id"), Some("1,2"));
    }
}

//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::gateway::Gateway;
use crate::routes::{self, api::Query, DumpView};
use crate::types::{GatewayError, Result};

/// Start the HTTP server on `listen` and serve until the process exits
pub async fn run(gateway: Arc<Gateway>, listen: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!("SCADA gateway listening on {}", listen);
    serve(gateway, listener).await
}

/// Serve connections from an already bound listener
pub async fn serve(gateway: Arc<Gateway>, listener: TcpListener) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let gateway = Arc::clone(&gateway);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let gateway = Arc::clone(&gateway);
                        async move { handle_request(gateway, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    gateway: Arc<Gateway>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = Query::parse(req.uri().query());

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::OPTIONS, _) => preflight_response(),

        (Method::GET, "/api/health") => routes::health_check(&gateway),

        (Method::GET, "/api/node_list") => routes::handle_node_list(gateway).await,

        (Method::GET, "/api/devx_list") => routes::handle_device_list(gateway, &query).await,

        (Method::GET, "/api/dump_devm") => {
            routes::handle_device_dump(gateway, &query, DumpView::Parameters).await
        }
        (Method::GET, "/api/dump_devm_param_names") => {
            routes::handle_device_dump(gateway, &query, DumpView::ParameterNames).await
        }
        (Method::GET, "/api/dump_devm_alarm") => {
            routes::handle_device_dump(gateway, &query, DumpView::Alarm).await
        }
        (Method::GET, "/api/dump_devm_leds") => {
            routes::handle_device_dump(gateway, &query, DumpView::Leds).await
        }

        (Method::POST, "/api/any") => match req.into_body().collect().await {
            Ok(body) => routes::handle_any(gateway, &body.to_bytes()).await,
            Err(e) => routes::error_response(GatewayError::BadRequest(format!(
                "Failed to read body: {}",
                e
            ))),
        },

        (Method::GET, "/api/restart") => routes::handle_restart(gateway),

        _ => not_found_response(),
    };

    Ok(response)
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}

fn not_found_response() -> Response<Full<Bytes>> {
    routes::json_response(StatusCode::NOT_FOUND, &json!({ "error": "Not found" }))
}

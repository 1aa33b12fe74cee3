//! Error types for the gateway
//!
//! Every failure the core can produce is one of these variants. They are
//! recovered at the gateway boundary and rendered as structured HTTP failures;
//! none of them terminate the process.

use hyper::StatusCode;

/// Main error type for gateway operations.
///
/// Cloneable so that one in-flight readiness outcome can be handed to every
/// caller awaiting it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Socket open or send failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Missing challenge, rejected login, missing session identity
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// No reply of the awaited kind arrived within the budget
    #[error("Timeout waiting for {discriminator}")]
    CorrelationTimeout { discriminator: String },

    /// Asynchronous operational alert from the remote endpoint
    #[error("Remote warning{}: {text}", .code.map(|c| format!(" {}", c)).unwrap_or_default())]
    RemoteWarning { code: Option<i64>, text: String },

    /// Resource cannot be served (stale cache or empty reply)
    #[error("{0}")]
    ResourceUnavailable(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Handshake(_) => StatusCode::BAD_GATEWAY,
            Self::CorrelationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::RemoteWarning { .. } => StatusCode::BAD_GATEWAY,
            Self::ResourceUnavailable(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<crate::protocol::ChallengeError> for GatewayError {
    fn from(err: crate::protocol::ChallengeError) -> Self {
        Self::Handshake(format!("Challenge could not be solved: {}", err))
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

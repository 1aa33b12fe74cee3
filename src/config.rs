//! Configuration for the SCADA gateway
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::gateway::Timeouts;

/// SCADA gateway - HTTP API over a single authenticated WebSocket session
#[derive(Parser, Debug, Clone)]
#[command(name = "scada-gateway")]
#[command(about = "HTTP gateway for a SCADA WebSocket endpoint")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8765")]
    pub listen: SocketAddr,

    /// Directory holding cache entries and the state record
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Credentials file (ws_url, login, password, node_id, did)
    #[arg(long, env = "CREDENTIALS_PATH", default_value = "config.json")]
    pub credentials_path: PathBuf,

    /// File receiving the latest binary frame
    #[arg(long, env = "CAPTURE_PATH", default_value = "binary.bin")]
    pub capture_path: PathBuf,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Budget for opening the upstream socket
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value = "10000")]
    pub connect_timeout_ms: u64,

    #[arg(long, env = "CHALLENGE_TIMEOUT_MS", default_value = "10000")]
    pub challenge_timeout_ms: u64,

    #[arg(long, env = "LOGIN_TIMEOUT_MS", default_value = "20000")]
    pub login_timeout_ms: u64,

    #[arg(long, env = "NODE_LIST_TIMEOUT_MS", default_value = "15000")]
    pub node_list_timeout_ms: u64,

    #[arg(long, env = "DEVICE_LIST_TIMEOUT_MS", default_value = "10000")]
    pub device_list_timeout_ms: u64,

    /// Budget for device dumps and passthrough requests
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Delay before reconnecting on /api/restart
    #[arg(long, env = "RESTART_DELAY_MS", default_value = "1000")]
    pub restart_delay_ms: u64,

    /// Maximum age of cache entries; entries never expire when unset
    #[arg(long, env = "CACHE_TTL_SECS")]
    pub cache_ttl_secs: Option<u64>,
}

impl Args {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    /// Reply budgets handed to the gateway
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            challenge: Duration::from_millis(self.challenge_timeout_ms),
            login: Duration::from_millis(self.login_timeout_ms),
            node_list: Duration::from_millis(self.node_list_timeout_ms),
            device_list: Duration::from_millis(self.device_list_timeout_ms),
            request: Duration::from_millis(self.request_timeout_ms),
            restart_delay: Duration::from_millis(self.restart_delay_ms),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let budgets = [
            ("CONNECT_TIMEOUT_MS", self.connect_timeout_ms),
            ("CHALLENGE_TIMEOUT_MS", self.challenge_timeout_ms),
            ("LOGIN_TIMEOUT_MS", self.login_timeout_ms),
            ("NODE_LIST_TIMEOUT_MS", self.node_list_timeout_ms),
            ("DEVICE_LIST_TIMEOUT_MS", self.device_list_timeout_ms),
            ("REQUEST_TIMEOUT_MS", self.request_timeout_ms),
        ];
        if let Some((name, _)) = budgets.iter().find(|(_, ms)| *ms == 0) {
            return Err(format!("{} must be greater than zero", name));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err("DATA_DIR must not be empty".to_string());
        }

        Ok(())
    }
}

//! SCADA gateway - HTTP API over one authenticated SCADA WebSocket session
//!
//! The gateway keeps a single long-lived, authenticated WebSocket session with
//! a SCADA endpoint and serves its resources over HTTP. Each HTTP request is
//! answered from the on-disk cache while the session is connected, or by one
//! correlated round trip over the live socket.
//!
//! ## Components
//!
//! - **Session**: owns the socket and the connection state machine
//! - **Correlator**: matches untagged replies to requests by discriminator
//! - **Gateway**: readiness, login handshake and cache-or-fetch
//! - **Cache**: one JSON file per resource plus the persisted state record
//! - **Server**: hyper HTTP front end

pub mod cache;
pub mod capture;
pub mod config;
pub mod correlator;
pub mod credentials;
pub mod gateway;
pub mod protocol;
pub mod routes;
pub mod server;
pub mod session;
pub mod types;

pub use config::Args;
pub use gateway::{Gateway, Timeouts};
pub use server::run;
pub use session::{ConnectionState, Session};
pub use types::{GatewayError, Result};

//! Request/reply correlation
//!
//! Replies from the SCADA endpoint carry no request identifier, only the
//! discriminator of the request they answer. The correlator keeps every
//! structured message of the current session in an append-only log and
//! resolves waiters against it:
//!
//! - a waiter resolves to the most recent matching message in the part of the
//!   log it observes
//! - a `user_warn` seen before any match fails the wait immediately
//! - otherwise the wait fails once its timeout elapses
//!
//! Appends wake waiters through a `watch` counter, so there is no polling.
//!
//! Live exchanges of one kind run one at a time. Two requests of the same
//! kind in flight together could not tell their replies apart.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};

use crate::protocol::codec::{self, Envelope};
use crate::protocol::kinds;
use crate::protocol::messages::warning_details;
use crate::session::ConnectionState;
use crate::types::{GatewayError, Result};

/// Write side of the live connection
pub trait Outbound: Send + Sync {
    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Write one frame to the socket
    fn write(&self, frame: Message) -> Result<()>;
}

/// Position in the message log. Waiters started from a mark only observe
/// messages appended after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mark(u64);

struct MessageLog {
    /// Absolute sequence number of `messages[0]`
    base: u64,
    messages: Vec<Arc<Envelope>>,
}

impl MessageLog {
    fn end(&self) -> u64 {
        self.base + self.messages.len() as u64
    }

    fn scan(&self, from: Mark, kind: &str) -> Option<Result<Arc<Envelope>>> {
        let start = from.0.saturating_sub(self.base) as usize;
        let mut latest = None;

        for env in self.messages.iter().skip(start) {
            if env.is_kind(kind) {
                latest = Some(Arc::clone(env));
            } else if latest.is_none() && env.is_kind(kinds::WARNING) {
                let (code, text) = warning_details(env);
                return Some(Err(GatewayError::RemoteWarning { code, text }));
            }
        }

        latest.map(Ok)
    }
}

/// Matches inbound messages to outstanding requests
pub struct Correlator {
    log: Mutex<MessageLog>,
    appended: watch::Sender<u64>,
    /// One lock per discriminator, held for a whole exchange
    exchanges: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            log: Mutex::new(MessageLog {
                base: 0,
                messages: Vec::new(),
            }),
            appended,
            exchanges: Mutex::new(HashMap::new()),
        }
    }

    fn log(&self) -> MutexGuard<'_, MessageLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new session log. Earlier messages become invisible to all waiters.
    pub fn reset(&self) {
        let mut log = self.log();
        log.base = log.end();
        log.messages.clear();
        debug!(base = log.base, "Message log reset");
    }

    /// Append an inbound message and wake waiters
    pub fn append(&self, envelope: Envelope) -> Arc<Envelope> {
        let envelope = Arc::new(envelope);
        {
            let mut log = self.log();
            log.messages.push(Arc::clone(&envelope));
        }
        self.appended.send_modify(|count| *count += 1);
        envelope
    }

    /// Number of messages in the current session log
    pub fn len(&self) -> usize {
        self.log().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current end of the log
    pub fn mark(&self) -> Mark {
        Mark(self.log().end())
    }

    /// Encode and write a request if the connection can carry it.
    ///
    /// Requests are dropped silently outside the connected and authenticating
    /// states; callers establish readiness first. Returns whether the frame was
    /// written.
    pub fn send(&self, outbound: &dyn Outbound, request: &Value) -> bool {
        let kind = request
            .get(codec::DISCRIMINATOR_FIELD)
            .and_then(Value::as_str)
            .unwrap_or("<none>");

        let state = outbound.state();
        if !state.accepts_sends() {
            debug!(kind, %state, "Dropping request, session cannot send");
            return false;
        }

        let frame = match codec::encode(request) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(kind, "Failed to encode request: {}", e);
                return false;
            }
        };

        match outbound.write(frame) {
            Ok(()) => {
                debug!(kind, "Request sent");
                true
            }
            Err(e) => {
                warn!(kind, "Failed to write request: {}", e);
                false
            }
        }
    }

    /// Wait for a message of `kind` anywhere in the current session log
    pub async fn wait_for(&self, kind: &str, timeout: Duration) -> Result<Arc<Envelope>> {
        let start = Mark(self.log().base);
        self.wait_since(start, kind, timeout).await
    }

    /// Wait for a message of `kind` appended after `mark`
    pub async fn wait_since(
        &self,
        mark: Mark,
        kind: &str,
        timeout: Duration,
    ) -> Result<Arc<Envelope>> {
        let mut appended = self.appended.subscribe();

        let watch_log = async {
            loop {
                if let Some(outcome) = self.log().scan(mark, kind) {
                    return outcome;
                }
                if appended.changed().await.is_err() {
                    return Err(GatewayError::Transport("message log closed".into()));
                }
            }
        };

        match tokio::time::timeout(timeout, watch_log).await {
            Ok(outcome) => outcome,
            Err(_) => Err(GatewayError::CorrelationTimeout {
                discriminator: kind.to_string(),
            }),
        }
    }

    fn exchange_lock(&self, kind: &str) -> Arc<AsyncMutex<()>> {
        let mut exchanges = self
            .exchanges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(exchanges.entry(kind.to_string()).or_default())
    }

    /// Send `request` and wait for the reply of `kind` that follows it.
    ///
    /// Waits for any earlier exchange of the same kind to finish first.
    pub async fn exchange(
        &self,
        outbound: &dyn Outbound,
        request: &Value,
        kind: &str,
        timeout: Duration,
    ) -> Result<Arc<Envelope>> {
        let lock = self.exchange_lock(kind);
        let _turn = lock.lock().await;

        let mark = self.mark();
        self.send(outbound, request);
        self.wait_since(mark, kind, timeout).await
    }
}

//! Upstream session
//!
//! The session owns the single WebSocket connection to the SCADA endpoint and
//! its lifecycle state. Socket activity arrives as events on a channel and is
//! applied in arrival order; events from a link that has since been replaced
//! are ignored.
//!
//! ```text
//! NoConnection --connect--> Connecting --open--> WaitingChallenge
//! WaitingChallenge --authenticate--> Authenticating --login--> Connected
//! any --socket error--> Error
//! any --socket closed--> Reconnecting
//! any --close--> NoConnection
//! ```

mod link;
pub mod state;

pub use state::ConnectionState;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

use crate::cache::CacheStore;
use crate::capture::CaptureSink;
use crate::correlator::{Correlator, Outbound};
use crate::credentials::CredentialStore;
use crate::protocol::codec::InboundMessage;
use crate::protocol::kinds;
use crate::protocol::messages::{is_duplicate_session, warning_details};
use crate::types::{GatewayError, Result};
use link::LinkEvent;

/// Handle on the live socket task
struct Link {
    generation: u64,
    outbound: mpsc::UnboundedSender<Message>,
    open: bool,
}

/// The single upstream session
pub struct Session {
    credentials: Arc<CredentialStore>,
    store: Arc<CacheStore>,
    correlator: Arc<Correlator>,
    capture: Arc<dyn CaptureSink>,
    connect_timeout: Duration,
    state: Mutex<ConnectionState>,
    link: Mutex<Option<Link>>,
    generations: AtomicU64,
    connect_lock: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn new(
        credentials: Arc<CredentialStore>,
        store: Arc<CacheStore>,
        correlator: Arc<Correlator>,
        capture: Arc<dyn CaptureSink>,
        connect_timeout: Duration,
    ) -> Self {
        let session = Self {
            credentials,
            store,
            correlator,
            capture,
            connect_timeout,
            state: Mutex::new(ConnectionState::NoConnection),
            link: Mutex::new(None),
            generations: AtomicU64::new(0),
            connect_lock: tokio::sync::Mutex::new(()),
        };
        if let Err(e) = session.store.write_state(ConnectionState::NoConnection) {
            warn!("Failed to persist initial connection state: {}", e);
        }
        session
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        *self.lock_state()
    }

    /// Move to `to` and persist it before returning
    fn transition(&self, to: ConnectionState) {
        let mut state = self.lock_state();
        let from = *state;
        *state = to;
        if let Err(e) = self.store.write_state(to) {
            warn!(state = %to, "Failed to persist connection state: {}", e);
        }
        drop(state);

        if from != to {
            info!(from = %from, to = %to, "Session state changed");
        }
    }

    /// Generation of the open link, if any. Changes every time a new socket opens.
    pub fn link_generation(&self) -> Option<u64> {
        self.lock_link()
            .as_ref()
            .filter(|link| link.open)
            .map(|link| link.generation)
    }

    pub fn is_open(&self) -> bool {
        self.link_generation().is_some()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_link()
            .as_ref()
            .is_some_and(|link| link.generation == generation)
    }

    /// Open the upstream socket. Returns at once when one is already open.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        if self.is_open() {
            debug!("Connect requested, socket already open");
            return Ok(());
        }

        let url = self.credentials.snapshot().ws_url;
        if url.is_empty() {
            self.transition(ConnectionState::Error);
            return Err(GatewayError::Config("no ws_url in credentials".into()));
        }

        self.transition(ConnectionState::Connecting);

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (opened_tx, opened_rx) = oneshot::channel();

        *self.lock_link() = Some(Link {
            generation,
            outbound: outbound_tx,
            open: false,
        });

        info!(url = %url, generation, "Connecting upstream");
        tokio::spawn(link::run(url, self.connect_timeout, outbound_rx, event_tx));
        tokio::spawn(Arc::clone(self).apply_events(generation, event_rx, opened_tx));

        match opened_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(GatewayError::Transport(
                "connection task ended before the socket opened".into(),
            )),
        }
    }

    async fn apply_events(
        self: Arc<Self>,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<LinkEvent>,
        opened: oneshot::Sender<Result<()>>,
    ) {
        let mut opened = Some(opened);

        while let Some(event) = events.recv().await {
            if !self.is_current(generation) {
                debug!(generation, "Ignoring event from replaced link");
                break;
            }

            match event {
                LinkEvent::Opened => {
                    if let Some(link) = self.lock_link().as_mut() {
                        link.open = true;
                    }
                    self.correlator.reset();
                    self.transition(ConnectionState::WaitingChallenge);
                    if let Some(tx) = opened.take() {
                        let _ = tx.send(Ok(()));
                    }
                }
                LinkEvent::Failed(reason) => {
                    error!(generation, "{}", reason);
                    self.release_link(generation);
                    self.transition(ConnectionState::Error);
                    if let Some(tx) = opened.take() {
                        let _ = tx.send(Err(GatewayError::Transport(reason)));
                    }
                }
                LinkEvent::Closed(reason) => {
                    info!(generation, ?reason, "Upstream socket closed");
                    self.release_link(generation);
                    self.transition(ConnectionState::Reconnecting);
                    if let Some(tx) = opened.take() {
                        let _ = tx.send(Err(GatewayError::Transport(
                            "socket closed before opening".into(),
                        )));
                    }
                }
                LinkEvent::Frame(frame) => self.dispatch(frame),
            }
        }
    }

    fn dispatch(&self, frame: InboundMessage) {
        match frame {
            InboundMessage::Binary(payload) => self.capture.capture(&payload),
            InboundMessage::Structured(envelope) => {
                let duplicate = is_duplicate_session(&envelope);
                if envelope.is_kind(kinds::WARNING) {
                    let (code, text) = warning_details(&envelope);
                    warn!(?code, text = %text, "Remote warning");
                } else {
                    debug!(kind = envelope.kind.as_deref().unwrap_or("<none>"), "Inbound message");
                }

                self.correlator.append(envelope);

                if duplicate {
                    warn!("Account logged on elsewhere, closing session");
                    self.close();
                }
            }
        }
    }

    fn release_link(&self, generation: u64) {
        let mut link = self.lock_link();
        if link.as_ref().is_some_and(|l| l.generation == generation) {
            *link = None;
        }
    }

    fn take_link(&self) -> Option<Link> {
        let link = self.lock_link().take();
        if let Some(link) = &link {
            let _ = link.outbound.send(Message::Close(None));
        }
        link
    }

    /// Move to `Authenticating` once the handshake starts
    pub fn begin_authentication(&self) {
        self.transition(ConnectionState::Authenticating);
    }

    /// Move to `Connected` once the login is accepted
    pub fn mark_authenticated(&self) {
        self.transition(ConnectionState::Connected);
    }

    /// Close the socket and return to `NoConnection`
    pub fn close(&self) {
        if let Some(link) = self.take_link() {
            info!(generation = link.generation, "Closing upstream session");
        }
        self.transition(ConnectionState::NoConnection);
    }

    /// Drop the socket after a failed handshake. A socket error keeps `Error`;
    /// anything else becomes `Reconnecting`.
    pub fn abort(&self) {
        if let Some(link) = self.take_link() {
            info!(generation = link.generation, "Aborting upstream session");
        }
        if self.state() != ConnectionState::Error {
            self.transition(ConnectionState::Reconnecting);
        }
    }
}

impl Outbound for Session {
    fn state(&self) -> ConnectionState {
        Session::state(self)
    }

    fn write(&self, frame: Message) -> Result<()> {
        let link = self.lock_link();
        match link.as_ref() {
            Some(link) if link.open => link
                .outbound
                .send(frame)
                .map_err(|_| GatewayError::Transport("socket task has stopped".into())),
            _ => Err(GatewayError::Transport("no open socket".into())),
        }
    }
}

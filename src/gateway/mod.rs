//! Gateway orchestrator
//!
//! Turns resource requests into cache hits or single live round trips.
//! Every live trip goes through [`Gateway::ensure_ready`], which coalesces
//! concurrent callers onto one connect-and-login sequence. Concurrent cold
//! reads of one resource share a single fetch the same way.

mod handshake;
pub mod shaping;

pub use handshake::Discovered;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::ResourceKey;
use crate::protocol::codec::{Envelope, DISCRIMINATOR_FIELD};
use crate::protocol::kinds;
use crate::protocol::messages::{
    as_identifier, device_dump_request, device_list_request, first_device_id, first_node_id,
    node_list_request,
};
use crate::session::{ConnectionState, Session};
use crate::types::{GatewayError, Result};

/// Reply budgets for each step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub challenge: Duration,
    pub login: Duration,
    pub node_list: Duration,
    pub device_list: Duration,
    /// Device dumps and passthrough requests
    pub request: Duration,
    /// Pause between closing and reopening on restart
    pub restart_delay: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            challenge: Duration::from_secs(10),
            login: Duration::from_secs(20),
            node_list: Duration::from_secs(15),
            device_list: Duration::from_secs(10),
            request: Duration::from_secs(10),
            restart_delay: Duration::from_secs(1),
        }
    }
}

/// Health snapshot served on `/api/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub time: DateTime<Utc>,
    pub connect_state: Option<ConnectionState>,
}

type Readiness = Shared<BoxFuture<'static, Result<()>>>;
type PendingFetch = Shared<BoxFuture<'static, Result<Value>>>;

pub struct Gateway {
    session: Arc<Session>,
    timeouts: Timeouts,
    /// Link generation the login succeeded on; 0 when none
    authenticated: AtomicU64,
    in_flight: Mutex<Option<Readiness>>,
    fetches: Mutex<HashMap<ResourceKey, PendingFetch>>,
}

impl Gateway {
    pub fn new(session: Arc<Session>, timeouts: Timeouts) -> Self {
        Self {
            session,
            timeouts,
            authenticated: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<Readiness>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_fetches(&self) -> MutexGuard<'_, HashMap<ResourceKey, PendingFetch>> {
        self.fetches.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether the open socket has completed the login
    pub fn is_ready(&self) -> bool {
        let authenticated = self.authenticated.load(Ordering::Acquire);
        authenticated != 0
            && self.session.link_generation() == Some(authenticated)
            && self.session.state() == ConnectionState::Connected
    }

    /// Connect and log in unless already done. Concurrent callers share one attempt.
    pub async fn ensure_ready(self: &Arc<Self>) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        let pending = {
            let mut slot = self.lock_in_flight();
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining in-flight connect sequence");
                    pending.clone()
                }
                None => {
                    let gateway = Arc::clone(self);
                    let pending = async move {
                        let outcome = gateway.establish().await;
                        *gateway.lock_in_flight() = None;
                        outcome
                    }
                    .boxed()
                    .shared();
                    *slot = Some(pending.clone());
                    tokio::spawn(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    async fn establish(&self) -> Result<()> {
        let outcome = match self.connect_and_login().await {
            Ok(discovered) if self.session.credentials().did().is_none() => {
                self.discover(discovered).await
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            warn!("Connect sequence failed: {}", e);
            self.authenticated.store(0, Ordering::Release);
            self.session.abort();
        }
        outcome
    }

    async fn connect_and_login(&self) -> Result<Discovered> {
        self.session.connect().await?;
        let generation = self
            .session
            .link_generation()
            .ok_or_else(|| GatewayError::Transport("socket closed while connecting".into()))?;

        if self.authenticated.load(Ordering::Acquire) == generation {
            return Ok(Discovered::default());
        }

        let discovered = handshake::authenticate(&self.session, &self.timeouts).await?;
        self.authenticated.store(generation, Ordering::Release);
        Ok(discovered)
    }

    /// Determine and persist the default node and device.
    ///
    /// An account without nodes or devices is not an error; failing to fetch
    /// the lists is.
    async fn discover(&self, mut found: Discovered) -> Result<()> {
        if found.node_id.is_none() {
            let nodes = self.cached_or_fetch(ResourceKey::NodeList).await?;
            found.node_id = first_node_id(&Envelope::new(nodes));
        }
        let Some(node_id) = found.node_id else {
            warn!("No node available for auto-discovery");
            return Ok(());
        };

        if found.did.is_none() {
            let devices = self.cached_or_fetch(ResourceKey::DeviceList { node_id }).await?;
            found.did = first_device_id(&Envelope::new(devices));
        }
        let Some(did) = found.did else {
            warn!(node_id, "No device available for auto-discovery");
            return Ok(());
        };

        info!(node_id, did, "Auto-discovered default device");
        self.session
            .credentials()
            .update_identifiers(Some(node_id), Some(did))
    }

    async fn cached_or_fetch(&self, key: ResourceKey) -> Result<Value> {
        match self.session.store().get(&key)? {
            Some(entry) => Ok(entry.payload),
            None => self.fetch(key).await,
        }
    }

    /// One live round trip for `key`; the payload is written to the cache.
    async fn fetch(&self, key: ResourceKey) -> Result<Value> {
        let (request, budget) = match key {
            ResourceKey::NodeList => (node_list_request(), self.timeouts.node_list),
            ResourceKey::DeviceList { node_id } => {
                (device_list_request(node_id), self.timeouts.device_list)
            }
            ResourceKey::DeviceDump { node_id, did } => {
                (device_dump_request(node_id, did), self.timeouts.request)
            }
        };

        let reply = self
            .session
            .correlator()
            .exchange(self.session.as_ref(), &request, key.kind(), budget)
            .await?;

        let payload = match key {
            ResourceKey::DeviceDump { .. } => reply.field("MSG").cloned().ok_or_else(|| {
                GatewayError::ResourceUnavailable(format!(
                    "No {} data available from WS",
                    key.kind()
                ))
            })?,
            _ => reply.body.clone(),
        };

        self.session.store().put(&key, &payload)?;
        Ok(payload)
    }

    /// Cache-or-fetch. A cached entry is served only while connected; without
    /// an entry the resource is fetched live.
    pub async fn resolve(self: &Arc<Self>, key: ResourceKey) -> Result<Value> {
        if let Some(entry) = self.session.store().get(&key)? {
            if self.session.state().serves_cache() {
                return Ok(entry.payload);
            }
            return Err(GatewayError::ResourceUnavailable(format!(
                "No {} data available",
                key.kind()
            )));
        }

        self.ensure_ready().await?;
        self.fetch_shared(key).await
    }

    /// Live fetch of `key`, joined by concurrent callers for the same key
    async fn fetch_shared(self: &Arc<Self>, key: ResourceKey) -> Result<Value> {
        let pending = {
            let mut fetches = self.lock_fetches();
            match fetches.get(&key) {
                Some(pending) => {
                    debug!(key = %key, "Joining in-flight fetch");
                    pending.clone()
                }
                None => {
                    let gateway = Arc::clone(self);
                    let pending = async move {
                        let outcome = gateway.fetch(key).await;
                        gateway.lock_fetches().remove(&key);
                        outcome
                    }
                    .boxed()
                    .shared();
                    fetches.insert(key, pending.clone());
                    tokio::spawn(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Forward an arbitrary request and return the reply of the same kind
    pub async fn passthrough(self: &Arc<Self>, request: Value) -> Result<Value> {
        let kind = request
            .get(DISCRIMINATOR_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::BadRequest(format!(
                    "body must carry a string '{}' field",
                    DISCRIMINATOR_FIELD
                ))
            })?;

        self.ensure_ready().await?;
        let reply = self
            .session
            .correlator()
            .exchange(self.session.as_ref(), &request, &kind, self.timeouts.request)
            .await?;

        if let Err(e) = self.write_through(&request, &reply) {
            warn!(kind = %kind, "Failed to cache passthrough reply: {}", e);
        }
        Ok(reply.body.clone())
    }

    /// Cache replies to passthrough requests that address a known resource
    fn write_through(&self, request: &Value, reply: &Envelope) -> Result<()> {
        let credentials = self.session.credentials();
        let identifier = |field: &str| {
            request
                .get(field)
                .and_then(as_identifier)
                .or_else(|| reply.field("MSG").and_then(|m| m.get(field)).and_then(as_identifier))
        };

        match reply.kind.as_deref() {
            Some(kinds::DEVICE_DUMP) => {
                let Some(payload) = reply.field("MSG") else {
                    return Ok(());
                };
                let node_id = identifier("node_id").or_else(|| credentials.node_id());
                let did = identifier("did").or_else(|| credentials.did());
                if let (Some(node_id), Some(did)) = (node_id, did) {
                    self.session
                        .store()
                        .put(&ResourceKey::DeviceDump { node_id, did }, payload)?;
                }
            }
            Some(kinds::DEVICE_LIST) => {
                let node_id = request
                    .get("Node")
                    .and_then(as_identifier)
                    .or_else(|| reply.field("Node").and_then(as_identifier))
                    .or_else(|| {
                        reply
                            .field("DevxList")
                            .and_then(|list| list.get(0))
                            .and_then(|device| device.get("Node"))
                            .and_then(as_identifier)
                    });
                if let Some(node_id) = node_id {
                    self.session
                        .store()
                        .put(&ResourceKey::DeviceList { node_id }, &reply.body)?;
                }
            }
            Some(kinds::NODE_LIST) => {
                self.session.store().put(&ResourceKey::NodeList, &reply.body)?;
                credentials.update_identifiers(first_node_id(reply), None)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Drop the session and reconnect after the restart delay
    pub fn restart(self: &Arc<Self>) {
        info!(
            delay_ms = self.timeouts.restart_delay.as_millis() as u64,
            "Restarting session"
        );
        self.session.close();
        self.authenticated.store(0, Ordering::Release);

        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(gateway.timeouts.restart_delay).await;
            if let Err(e) = gateway.ensure_ready().await {
                warn!("Reconnect after restart failed: {}", e);
            }
        });
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            time: Utc::now(),
            connect_state: self.session.store().read_state(),
        }
    }
}

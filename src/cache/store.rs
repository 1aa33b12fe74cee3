//! Cache store implementation
//!
//! File-backed store: one pretty-printed JSON file per resource plus a
//! `state.json` record holding the last known connection state. Every write
//! replaces a whole file through a rename, so readers never observe a torn
//! entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::keys::ResourceKey;
use crate::session::ConnectionState;
use crate::types::Result;

/// File holding the persisted connection state
pub const STATE_FILE: &str = "state.json";

/// A cached resource with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: ResourceKey,
    /// Last payload fetched for this resource
    pub payload: Value,
    /// When the payload was written
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Check the entry against an optional maximum age
    pub fn is_fresh(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            None => true,
            Some(ttl) => {
                let age = Utc::now().signed_duration_since(self.written_at);
                age.to_std().unwrap_or(Duration::ZERO) < ttl
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StateRecord {
    connect_state: Option<ConnectionState>,
}

/// Persistent resource cache
pub struct CacheStore {
    dir: PathBuf,
    ttl: Option<Duration>,
    tmp_seq: AtomicU64,
}

impl CacheStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>, ttl: Option<Duration>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            ttl,
            tmp_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn path_for(&self, key: &ResourceKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Get an entry by key. Entries older than the TTL read as absent.
    pub fn get(&self, key: &ResourceKey) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key = %key, "Cache miss");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let payload: Value = match serde_json::from_slice(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                return Ok(None);
            }
        };
        let written_at = fs::metadata(&path)?
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let entry = CacheEntry {
            key: *key,
            payload,
            written_at,
        };
        if !entry.is_fresh(self.ttl) {
            debug!(key = %key, "Cache entry expired");
            return Ok(None);
        }

        debug!(key = %key, "Cache hit");
        Ok(Some(entry))
    }

    /// Store a payload, overwriting any previous entry
    pub fn put(&self, key: &ResourceKey, payload: &Value) -> Result<CacheEntry> {
        let bytes = serde_json::to_vec_pretty(payload)?;
        self.write_atomic(&self.path_for(key), &bytes)?;
        debug!(key = %key, bytes = bytes.len(), "Cache set");
        Ok(CacheEntry {
            key: *key,
            payload: payload.clone(),
            written_at: Utc::now(),
        })
    }

    /// Persist the connection state record
    pub fn write_state(&self, state: ConnectionState) -> Result<()> {
        let record = StateRecord {
            connect_state: Some(state),
        };
        let bytes = serde_json::to_vec_pretty(&record)?;
        self.write_atomic(&self.dir.join(STATE_FILE), &bytes)
    }

    /// Read the persisted connection state, if any
    pub fn read_state(&self) -> Option<ConnectionState> {
        let raw = fs::read(self.dir.join(STATE_FILE)).ok()?;
        serde_json::from_slice::<StateRecord>(&raw)
            .ok()
            .and_then(|r| r.connect_state)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(".{}.{}.{}.tmp", file_name, std::process::id(), seq));

        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

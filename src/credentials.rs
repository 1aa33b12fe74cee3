//! Upstream credentials record
//!
//! Loaded once from a JSON file. The gateway never edits the endpoint or the
//! account, but writes discovered node/device identifiers back to the same
//! file, leaving every other field untouched.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

use crate::protocol::messages::as_identifier;
use crate::types::{GatewayError, Result};

/// Connection credentials and last-known identifiers
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// WebSocket address of the SCADA endpoint
    #[serde(default)]
    pub ws_url: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
    /// Last known node identifier
    #[serde(default, deserialize_with = "deserialize_identifier")]
    pub node_id: Option<u64>,
    /// Last known device identifier
    #[serde(default, deserialize_with = "deserialize_identifier")]
    pub did: Option<u64>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ws_url", &self.ws_url)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("node_id", &self.node_id)
            .field("did", &self.did)
            .finish()
    }
}

/// Accepts numbers, numeric strings and empty strings; zero and empty mean unknown.
fn deserialize_identifier<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(as_identifier(&value).filter(|id| *id != 0))
}

/// File-backed credentials holder
pub struct CredentialStore {
    path: PathBuf,
    current: RwLock<Credentials>,
}

impl CredentialStore {
    /// Load credentials from `path`. A missing file yields empty credentials.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let current = match fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                GatewayError::Config(format!("invalid credentials file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    path = %path.display(),
                    "Credentials file not found, using empty credentials"
                );
                Credentials::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            current: RwLock::new(current),
        })
    }

    /// Build a store around in-memory credentials persisted at `path`
    pub fn with_credentials(path: impl Into<PathBuf>, credentials: Credentials) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(credentials),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current credentials
    pub fn snapshot(&self) -> Credentials {
        self.current
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn node_id(&self) -> Option<u64> {
        self.snapshot().node_id
    }

    pub fn did(&self) -> Option<u64> {
        self.snapshot().did
    }

    /// Record discovered identifiers in memory and in the credentials file.
    /// `None` leaves the corresponding field as it is.
    pub fn update_identifiers(&self, node_id: Option<u64>, did: Option<u64>) -> Result<()> {
        if node_id.is_none() && did.is_none() {
            return Ok(());
        }

        let mut doc = match fs::read(&self.path) {
            Ok(raw) => match serde_json::from_slice::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };

        {
            let mut current = self
                .current
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(id) = node_id {
                current.node_id = Some(id);
                doc.insert("node_id".into(), Value::from(id));
            }
            if let Some(id) = did {
                current.did = Some(id);
                doc.insert("did".into(), Value::from(id));
            }
        }

        fs::write(&self.path, serde_json::to_vec_pretty(&Value::Object(doc))?)?;
        info!(?node_id, ?did, "Persisted discovered identifiers");
        Ok(())
    }
}

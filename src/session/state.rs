//! Connection lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authoritative state of the upstream session.
///
/// Serialized under the labels existing `state.json` consumers read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    #[serde(rename = "No connection")]
    NoConnection,
    Connecting,
    #[serde(rename = "Waiting for fedai")]
    WaitingChallenge,
    #[serde(rename = "Authorization")]
    Authenticating,
    Connected,
    Error,
    #[serde(rename = "Reconnect")]
    Reconnecting,
}

impl ConnectionState {
    /// Whether an outbound frame may be written in this state
    pub fn accepts_sends(self) -> bool {
        matches!(
            self,
            Self::WaitingChallenge | Self::Authenticating | Self::Connected
        )
    }

    /// Whether cached resources may be served in this state
    pub fn serves_cache(self) -> bool {
        self == Self::Connected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoConnection => "No connection",
            Self::Connecting => "Connecting",
            Self::WaitingChallenge => "Waiting for fedai",
            Self::Authenticating => "Authorization",
            Self::Connected => "Connected",
            Self::Error => "Error",
            Self::Reconnecting => "Reconnect",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::NoConnection
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_gate() {
        assert!(ConnectionState::Connected.accepts_sends());
        assert!(ConnectionState::WaitingChallenge.accepts_sends());
        assert!(ConnectionState::Authenticating.accepts_sends());
        assert!(!ConnectionState::Connecting.accepts_sends());
        assert!(!ConnectionState::Reconnecting.accepts_sends());
        assert!(!ConnectionState::Error.accepts_sends());
        assert!(!ConnectionState::NoConnection.accepts_sends());
    }

    #[test]
    fn test_serialized_name_matches_display() {
        for state in [
            ConnectionState::NoConnection,
            ConnectionState::Connecting,
            ConnectionState::WaitingChallenge,
            ConnectionState::Authenticating,
            ConnectionState::Connected,
            ConnectionState::Error,
            ConnectionState::Reconnecting,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state));
            assert_eq!(serde_json::from_str::<ConnectionState>(&json).unwrap(), state);
        }
    }

    #[test]
    fn test_persisted_labels() {
        let labels: Vec<_> = [
            ConnectionState::NoConnection,
            ConnectionState::WaitingChallenge,
            ConnectionState::Authenticating,
            ConnectionState::Reconnecting,
        ]
        .iter()
        .map(|s| serde_json::to_value(s).unwrap())
        .collect();
        assert_eq!(
            labels,
            vec!["No connection", "Waiting for fedai", "Authorization", "Reconnect"]
        );
    }
}

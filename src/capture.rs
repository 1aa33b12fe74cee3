//! Side channel for opaque binary frames
//!
//! Binary payloads are never correlated. They are handed to a sink as soon as
//! they arrive.

use std::fs;
use std::path::PathBuf;
use tracing::{debug, error};

/// Receiver of binary payloads
pub trait CaptureSink: Send + Sync {
    fn capture(&self, payload: &[u8]);
}

/// Keeps the most recent binary payload in a single file
pub struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureSink for FileCapture {
    fn capture(&self, payload: &[u8]) {
        match fs::write(&self.path, payload) {
            Ok(()) => debug!(
                bytes = payload.len(),
                path = %self.path.display(),
                "Captured binary frame"
            ),
            Err(e) => error!(
                path = %self.path.display(),
                "Failed to capture binary frame: {}",
                e
            ),
        }
    }
}

/// Discards binary payloads
pub struct NullCapture;

impl CaptureSink for NullCapture {
    fn capture(&self, _payload: &[u8]) {}
}

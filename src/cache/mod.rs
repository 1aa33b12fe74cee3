//! Resource cache
//!
//! Last-known payload of every resource fetched from the SCADA endpoint,
//! together with the last-known connection state. Entries are never expired
//! proactively; whether they may be served depends on the session state at
//! read time.

pub mod keys;
pub mod store;

pub use keys::ResourceKey;
pub use store::{CacheEntry, CacheStore, STATE_FILE};

//! SCADA wire protocol
//!
//! JSON-framed messages over a persistent WebSocket. Every message names its
//! kind in the `Request` field; replies echo the kind of the request.

pub mod challenge;
pub mod codec;
pub mod messages;

pub use challenge::{solve, ChallengeError};
pub use codec::{Envelope, InboundMessage};
pub use messages::kinds;

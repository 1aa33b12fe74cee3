//! Socket task for one upstream connection
//!
//! Owns the WebSocket for its whole life. Outbound frames arrive on a channel;
//! everything that happens on the socket is reported as a [`LinkEvent`].

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info};

use crate::protocol::codec::{self, InboundMessage};

/// Something that happened on a link
#[derive(Debug)]
pub(super) enum LinkEvent {
    /// Socket is open
    Opened,
    /// Socket failed to open or broke
    Failed(String),
    /// Peer closed the socket or the stream ended
    Closed(Option<String>),
    /// A decoded data frame
    Frame(InboundMessage),
}

/// Connect to `url` and pump frames until the socket ends.
///
/// Dropping the outbound sender closes the socket.
pub(super) async fn run(
    url: String,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let ws = match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            let _ = events.send(LinkEvent::Failed(format!("WebSocket connect failed: {}", e)));
            return;
        }
        Err(_) => {
            let _ = events.send(LinkEvent::Failed(format!(
                "WebSocket connect timed out after {}ms",
                connect_timeout.as_millis()
            )));
            return;
        }
    };

    info!(url = %url, "Upstream WebSocket opened");
    let _ = events.send(LinkEvent::Opened);

    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(frame) => {
                    let closing = matches!(frame, Message::Close(_));
                    if let Err(e) = sink.send(frame).await {
                        let _ = events
                            .send(LinkEvent::Failed(format!("WebSocket send failed: {}", e)));
                        return;
                    }
                    if closing {
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.to_string());
                    info!(?reason, "Upstream closed connection");
                    let _ = events.send(LinkEvent::Closed(reason));
                    return;
                }
                Some(Ok(msg)) => {
                    if let Some(decoded) = codec::decode_message(&msg) {
                        let _ = events.send(LinkEvent::Frame(decoded));
                    }
                }
                Some(Err(e)) => {
                    let _ = events.send(LinkEvent::Failed(format!("WebSocket error: {}", e)));
                    return;
                }
                None => {
                    let _ = events.send(LinkEvent::Closed(None));
                    return;
                }
            }
        }
    }

    debug!("Upstream WebSocket closed locally");
    let _ = events.send(LinkEvent::Closed(Some("closed locally".into())));
}

//! Per-client WebSocket connection handling.
//!
//! Each upgraded socket gets its own `ConnectionHandler` that:
//! - Joins the channel's registry (or closes immediately if it is full)
//! - Spawns a writer task draining the subscription queue into the socket
//! - Spawns a reader task that only watches for close or error
//! - Leaves the registry exactly once, whichever task finishes first
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Socket errors are logged and result in graceful disconnect

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use clickcam_core::FrameBuffer;

use crate::subscribers::{RegistryError, SubscriberId, SubscriberRegistry};

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Payloads that can be written to a WebSocket.
pub trait Outbound: Clone + Send + Sync + 'static {
    fn into_message(self) -> Message;
}

impl Outbound for String {
    fn into_message(self) -> Message {
        Message::Text(self)
    }
}

impl Outbound for FrameBuffer {
    /// Copies the shared frame into the message's owned buffer.
    fn into_message(self) -> Message {
        Message::Binary(self.into_bytes().to_vec())
    }
}

/// Lifecycle of a relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Connection handler for a single WebSocket client.
pub struct ConnectionHandler<T> {
    registry: SubscriberRegistry<T>,
    state: ConnectionState,
}

impl<T: Outbound> ConnectionHandler<T> {
    pub fn new(registry: SubscriberRegistry<T>) -> Self {
        Self {
            registry,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, next: ConnectionState) {
        trace!(
            channel = self.registry.name(),
            from = %self.state,
            to = %next,
            "Connection state changed"
        );
        self.state = next;
    }

    /// Serves the socket until either side closes. Returns the final state.
    pub async fn run(mut self, mut socket: WebSocket) -> ConnectionState {
        let subscription = match self.registry.join().await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(channel = self.registry.name(), error = %e, "Rejecting client");
                reject(&mut socket, &e).await;
                self.transition(ConnectionState::Closed);
                return self.state;
            }
        };

        let id = subscription.id;
        self.transition(ConnectionState::Open);
        debug!(channel = self.registry.name(), subscriber = %id, "Client connected");

        let (sink, stream) = socket.split();
        let mut send_task = tokio::spawn(write_loop(sink, subscription.receiver, id));
        let mut recv_task = tokio::spawn(read_loop(stream, id));

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        self.registry.leave(id).await;
        self.transition(ConnectionState::Closed);
        debug!(channel = self.registry.name(), subscriber = %id, "Client disconnected");
        self.state
    }
}

/// Closes a socket the registry refused.
async fn reject(socket: &mut WebSocket, error: &RegistryError) {
    let frame = CloseFrame {
        code: close_code::AGAIN,
        reason: Cow::Owned(error.to_string()),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send close frame");
    }
}

async fn write_loop<T: Outbound>(
    mut sink: SplitSink<WebSocket, Message>,
    mut receiver: mpsc::Receiver<T>,
    id: SubscriberId,
) {
    while let Some(payload) = receiver.recv().await {
        match timeout(WRITE_TIMEOUT, sink.send(payload.into_message())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(subscriber = %id, error = %e, "Write failed");
                break;
            }
            Err(_) => {
                warn!(subscriber = %id, "Write timed out");
                break;
            }
        }
    }

    // Queue closed (registry cleared) or socket failed
    if let Err(e) = sink.close().await {
        trace!(subscriber = %id, error = %e, "Close after write loop failed");
    }
}

async fn read_loop(mut stream: SplitStream<WebSocket>, id: SubscriberId) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!(subscriber = %id, "Client sent close");
                break;
            }
            Ok(_) => {
                // Inbound traffic is ignored; pings are answered by axum
            }
            Err(e) => {
                debug!(subscriber = %id, error = %e, "Read failed");
                break;
            }
        }
    }
}

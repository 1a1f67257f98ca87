//! Routers - fan-out from producers to subscriber registries.
//!
//! - The event router turns each [`DetectionEvent`] into its wire JSON once
//!   and broadcasts the text to every event subscriber.
//! - The frame router forwards each captured frame to every video
//!   subscriber. Frames are reference counted, so every subscriber queue
//!   shares one allocation. The bytes are copied once per socket at write
//!   time, since a WebSocket binary message owns its buffer.
//!
//! Neither router knows anything about the sockets behind the registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use clickcam_core::{DetectionEvent, FrameBuffer};
use clickcam_protocol::EventMessage;

use crate::detector::DetectorHandle;
use crate::subscribers::SubscriberRegistry;

/// Relay counters shared with the status endpoint.
#[derive(Debug, Default)]
pub struct RelayStats {
    events_relayed: AtomicU64,
    frames_relayed: AtomicU64,
}

impl RelayStats {
    pub fn events_relayed(&self) -> u64 {
        self.events_relayed.load(Ordering::Relaxed)
    }

    pub fn frames_relayed(&self) -> u64 {
        self.frames_relayed.load(Ordering::Relaxed)
    }
}

/// Serialises a detection event for the event channel.
fn encode_event(event: &DetectionEvent) -> Option<String> {
    match EventMessage::from(event).to_json() {
        Ok(json) => Some(json),
        Err(e) => {
            error!(error = %e, "Failed to serialize detection event");
            None
        }
    }
}

/// Relays detector events to event subscribers.
///
/// Subscribes to the detector before spawning, so no event emitted after
/// this call returns is missed.
pub fn spawn_event_router(
    detector: &DetectorHandle,
    registry: SubscriberRegistry<String>,
    stats: Arc<RelayStats>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let events = detector.subscribe();
    tokio::spawn(run_event_router(events, registry, stats, cancel))
}

async fn run_event_router(
    mut events: broadcast::Receiver<DetectionEvent>,
    registry: SubscriberRegistry<String>,
    stats: Arc<RelayStats>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "Event router lagged behind detector");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Detector closed, event router stopping");
                    break;
                }
            },
        };

        let Some(json) = encode_event(&event) else {
            continue;
        };

        let report = registry.broadcast(json).await;
        stats.events_relayed.fetch_add(1, Ordering::Relaxed);
        debug!(
            kind = ?event.kind(),
            delivered = report.delivered,
            skipped = report.skipped,
            "Event relayed"
        );
    }
}

/// Relays captured frames to video subscribers.
pub fn spawn_frame_router(
    frames: mpsc::Receiver<FrameBuffer>,
    registry: SubscriberRegistry<FrameBuffer>,
    stats: Arc<RelayStats>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_frame_router(frames, registry, stats, cancel))
}

async fn run_frame_router(
    mut frames: mpsc::Receiver<FrameBuffer>,
    registry: SubscriberRegistry<FrameBuffer>,
    stats: Arc<RelayStats>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => {
                    debug!("Frame sink closed, frame router stopping");
                    break;
                }
            },
        };

        // Frames arrive at the capture rate; skipped counts live per subscriber
        registry.broadcast(frame).await;
        stats.frames_relayed.fetch_add(1, Ordering::Relaxed);
    }
}

//! Client interface for interacting with the DetectorActor.
//!
//! The `DetectorHandle` provides a cheap-to-clone interface for feeding
//! signals to the actor and subscribing to detection events.

use tokio::sync::{broadcast, mpsc, oneshot};

use clickcam_core::{DetectionEvent, DetectionSignal};

use super::commands::{DetectionStatus, DetectorCommand, DetectorError};

/// Handle for interacting with the detector actor.
///
/// Every detection source gets a clone; the actor stops once all clones
/// are dropped.
#[derive(Clone)]
pub struct DetectorHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<DetectorCommand>,

    /// Event broadcaster for subscribing to transitions
    event_sender: broadcast::Sender<DetectionEvent>,
}

impl DetectorHandle {
    /// Create a new detector handle.
    pub fn new(
        sender: mpsc::Sender<DetectorCommand>,
        event_sender: broadcast::Sender<DetectionEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Feed a raw detection signal to the state machine.
    ///
    /// Returns once the signal is queued, not once it is processed.
    ///
    /// # Errors
    ///
    /// - `DetectorError::ChannelClosed` if the actor has shut down
    pub async fn signal(&self, signal: DetectionSignal) -> Result<(), DetectorError> {
        self.sender
            .send(DetectorCommand::Signal(signal))
            .await
            .map_err(|_| DetectorError::ChannelClosed)
    }

    /// Get a status snapshot.
    ///
    /// Returns `None` if communication with the actor fails.
    pub async fn status(&self) -> Option<DetectionStatus> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(DetectorCommand::GetStatus { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Subscribe to detection events.
    ///
    /// Only events emitted after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<DetectionEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

//! Detector actor commands, errors, and status.
//!
//! This module defines the message types for communicating with the `DetectorActor`:
//! - `DetectorCommand`: Commands sent to the actor
//! - `DetectorError`: Errors that can occur when talking to the actor
//! - `DetectionStatus`: Snapshot returned by status queries

use std::time::Duration;

use chrono::{DateTime, Utc};
use clickcam_core::{DetectionSignal, DetectionState};
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Detector Commands
// ============================================================================

/// Commands sent to the detector actor.
#[derive(Debug)]
pub enum DetectorCommand {
    /// A detection source observed a qualifying event.
    ///
    /// Fire-and-forget: accepted or suppressed depending on current state.
    Signal(DetectionSignal),

    /// Get a snapshot of the detector state.
    GetStatus {
        /// Channel to send the result
        respond_to: oneshot::Sender<DetectionStatus>,
    },
}

// ============================================================================
// Detector Errors
// ============================================================================

/// Errors that can occur when talking to the detector.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectorError {
    /// The actor has shut down.
    #[error("detector channel closed")]
    ChannelClosed,
}

// ============================================================================
// Status
// ============================================================================

/// Point-in-time view of the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionStatus {
    pub state: DetectionState,

    /// Time left until the pending reset fires (None while idle)
    pub reset_in: Option<Duration>,

    pub last_click: Option<DateTime<Utc>>,

    /// Clicks emitted since startup
    pub clicks: u64,

    /// Signals dropped because the detector was suppressed
    pub suppressed_signals: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_error_display() {
        assert_eq!(
            DetectorError::ChannelClosed.to_string(),
            "detector channel closed"
        );
    }

    #[tokio::test]
    async fn test_status_oneshot_dropped() {
        let (tx, rx) = oneshot::channel::<DetectionStatus>();
        drop(tx);
        assert!(rx.await.is_err());
    }
}

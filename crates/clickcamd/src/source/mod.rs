//! Detection sources - hardware observation feeding the detector.
//!
//! A source watches some piece of hardware and calls
//! [`DetectorHandle::signal`] when it sees a qualifying event. Sources are
//! allowed to be noisy; the detector does the real debouncing. Transient
//! read errors are logged and retried by the source itself and never reach
//! the detector.
//!
//! Two interchangeable implementations exist:
//! - [`DeviceDirectorySource`] - a new entry under `/dev/input` (device plugged in)
//! - [`InputEventSource`] - a button press decoded from `/dev/input/mice`

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{DetectionConfig, SourceKind};
use crate::detector::DetectorHandle;

mod device_dir;
mod input_event;

pub use device_dir::{count_devices, DeviceCounter, DeviceDirectorySource};
pub use input_event::{InputEventSource, PacketDecoder};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised inside a source. Logged, never propagated to the detector.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to open {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("{path} closed unexpectedly")]
    Eof { path: PathBuf },

    #[error("blocking task failed: {0}")]
    Task(String),
}

// ============================================================================
// Source Trait
// ============================================================================

/// A hardware observation mechanism.
#[async_trait]
pub trait DetectionSource: Send {
    /// Short name for logs and status reports.
    fn name(&self) -> &'static str;

    /// Observes until cancelled, signalling the detector on each event.
    async fn run(self: Box<Self>, detector: DetectorHandle, cancel: CancellationToken);
}

/// Builds the source selected in the configuration.
///
/// Returns `None` when detection is disabled.
pub fn from_config(config: &DetectionConfig) -> Option<Box<dyn DetectionSource>> {
    match config.source {
        SourceKind::DeviceDirectory => Some(Box::new(DeviceDirectorySource::new(
            config.device_dir.clone(),
            config.device_prefix.clone(),
            config.poll_interval(),
        ))),
        SourceKind::InputEvents => Some(Box::new(InputEventSource::new(
            config.mouse_device.clone(),
            config.poll_interval(),
        ))),
        SourceKind::Disabled => None,
    }
}

/// Spawns a source on its own task.
pub fn spawn_source(
    source: Box<dyn DetectionSource>,
    detector: DetectorHandle,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = source.name();
        info!(source = name, "Detection source started");
        source.run(detector, cancel).await;
        debug!(source = name, "Detection source stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_selects_source() {
        let mut config = DetectionConfig::default();
        assert_eq!(from_config(&config).map(|s| s.name()), Some("device_directory"));

        config.source = SourceKind::InputEvents;
        assert_eq!(from_config(&config).map(|s| s.name()), Some("input_events"));

        config.source = SourceKind::Disabled;
        assert!(from_config(&config).is_none());
    }

    #[test]
    fn test_source_error_display() {
        let err = SourceError::Read {
            path: PathBuf::from("/dev/input"),
            message: "permission denied".to_string(),
        };
        assert_eq!(err.to_string(), "failed to read /dev/input: permission denied");
    }
}

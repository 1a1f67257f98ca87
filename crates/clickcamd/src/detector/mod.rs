//! Click detector using Actor pattern.
//!
//! The detector owns the idle/suppressed lifecycle. Detection sources feed it
//! raw signals through a tokio mpsc channel; it collapses bursts into a single
//! click, arms the auto-reset deadline, and publishes events on a broadcast
//! channel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ DetectionSource │────▶│  DetectorActor  │────▶│ Broadcast Channel│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                       │
//!         │   DetectorCommand     │   DetectionEvent      │
//!         │   (mpsc channel)      │   (broadcast)         │
//!         ▼                       ▼                       ▼
//!    raw, noisy             Idle / Suppressed        EventRouter
//!    signals                { reset_at }
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;

pub use actor::DetectorActor;
pub use commands::{DetectionStatus, DetectorCommand, DetectorError};
pub use handle::DetectorHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 64;

/// Time the detector stays suppressed after a click.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

/// What a signal does while the detector is suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RearmPolicy {
    /// The signal is dropped and the pending reset keeps its deadline.
    #[default]
    Ignore,

    /// The signal is dropped but the pending reset is pushed back to a full
    /// cooldown from now.
    Extend,
}

impl std::fmt::Display for RearmPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ignore => write!(f, "ignore"),
            Self::Extend => write!(f, "extend"),
        }
    }
}

/// Spawn the detector actor and return a handle for interaction.
///
/// The actor runs until every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use clickcamd::detector::{spawn_detector, RearmPolicy, DEFAULT_COOLDOWN};
/// use clickcam_core::DetectionSignal;
///
/// #[tokio::main]
/// async fn main() {
///     let detector = spawn_detector(DEFAULT_COOLDOWN, RearmPolicy::Ignore);
///     let mut events = detector.subscribe();
///
///     let _ = detector.signal(DetectionSignal::new()).await;
///     let click = events.recv().await;
/// }
/// ```
pub fn spawn_detector(cooldown: Duration, rearm: RearmPolicy) -> DetectorHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = DetectorActor::new(cmd_rx, event_tx.clone(), cooldown, rearm);
    tokio::spawn(actor.run());

    DetectorHandle::new(cmd_tx, event_tx)
}

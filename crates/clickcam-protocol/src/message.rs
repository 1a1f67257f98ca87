//! Protocol message types for the relay channels.

use chrono::{DateTime, Utc};
use clickcam_core::{DetectionEvent, DetectionState, MouseButton};
use serde::{Deserialize, Serialize};

use crate::timestamp;

/// Messages sent to `/api/ws` subscribers.
///
/// Serialised as `{"type": "mouse_click" | "detection_reset", "timestamp": ..,
/// "button"?: .., "message"?: ..}`. Only clicks carry a button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventMessage {
    /// A click was detected; further clicks are ignored until reset
    MouseClick {
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
        button: MouseButton,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// The cooldown elapsed and the detector is listening again
    DetectionReset {
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl EventMessage {
    /// Returns the `type` tag as it appears on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::MouseClick { .. } => "mouse_click",
            Self::DetectionReset { .. } => "detection_reset",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::MouseClick { timestamp, .. } | Self::DetectionReset { timestamp, .. } => {
                *timestamp
            }
        }
    }

    /// Serialises the message to its JSON text form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&DetectionEvent> for EventMessage {
    fn from(event: &DetectionEvent) -> Self {
        match event {
            DetectionEvent::Click {
                timestamp,
                button,
                message,
            } => Self::MouseClick {
                timestamp: *timestamp,
                button: *button,
                message: message.clone(),
            },
            DetectionEvent::Reset { timestamp, message } => Self::DetectionReset {
                timestamp: *timestamp,
                message: message.clone(),
            },
        }
    }
}

impl From<DetectionEvent> for EventMessage {
    fn from(event: DetectionEvent) -> Self {
        Self::from(&event)
    }
}

/// Detector portion of the status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub state: DetectionState,

    /// Name of the configured detection source
    pub source: String,

    /// When the last accepted click happened
    #[serde(default, with = "timestamp::option")]
    pub last_click: Option<DateTime<Utc>>,

    /// Number of clicks emitted since startup
    pub clicks: u64,

    /// Number of signals swallowed by the cooldown
    pub suppressed_signals: u64,
}

/// Response body of `/api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Daemon version
    pub version: String,

    pub detection: DetectionReport,

    /// Live `/api/ws` connections
    pub event_subscribers: usize,

    /// Live `/api/video` connections
    pub video_subscribers: usize,

    /// Frames handed to the video registry since startup
    pub frames_relayed: u64,

    /// Times the capture process has been restarted
    pub capture_restarts: u64,
}

//! Detection signals and the events derived from them.
//!
//! A [`DetectionSignal`] is the raw, possibly noisy indication produced by a
//! hardware source. The detector turns accepted signals into
//! [`DetectionEvent`]s, which are the only thing ever broadcast.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DomainError;

/// Message attached to every reset event.
pub const RESET_MESSAGE: &str = "Detection reset, listening for clicks";

// ============================================================================
// Mouse Button
// ============================================================================

/// Mouse button associated with a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// All buttons, in PS/2 bit order (bit 0 = left).
    pub const ALL: [MouseButton; 3] = [Self::Left, Self::Right, Self::Middle];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MouseButton {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "middle" => Ok(Self::Middle),
            _ => Err(DomainError::UnknownButton {
                label: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Detection Signal
// ============================================================================

/// Raw signal from a detection source.
///
/// Sources may fire these in bursts; the detector collapses them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionSignal {
    /// Button that triggered the signal, if the source knows it
    pub button: Option<MouseButton>,

    /// Human-readable description from the source
    pub message: Option<String>,
}

impl DetectionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_button(mut self, button: MouseButton) -> Self {
        self.button = Some(button);
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// Detection Event
// ============================================================================

/// Discriminant of a [`DetectionEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionKind {
    Click,
    Reset,
}

/// Event emitted by the detector on each state transition.
///
/// A closed union: a reset can never carry a button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionEvent {
    /// Idle -> Suppressed: a qualifying event was accepted.
    Click {
        timestamp: DateTime<Utc>,
        button: MouseButton,
        message: Option<String>,
    },

    /// Suppressed -> Idle: the cooldown elapsed.
    Reset {
        timestamp: DateTime<Utc>,
        message: Option<String>,
    },
}

impl DetectionEvent {
    /// Builds the click event for an accepted signal.
    ///
    /// Signals that don't name a button are reported as left clicks.
    pub fn click(signal: DetectionSignal, timestamp: DateTime<Utc>) -> Self {
        Self::Click {
            timestamp,
            button: signal.button.unwrap_or_default(),
            message: signal.message,
        }
    }

    pub fn reset(timestamp: DateTime<Utc>) -> Self {
        Self::Reset {
            timestamp,
            message: Some(RESET_MESSAGE.to_string()),
        }
    }

    pub fn kind(&self) -> DetectionKind {
        match self {
            Self::Click { .. } => DetectionKind::Click,
            Self::Reset { .. } => DetectionKind::Reset,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Click { timestamp, .. } | Self::Reset { timestamp, .. } => *timestamp,
        }
    }

    /// Button label for clicks, `None` for resets.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::Click { button, .. } => Some(button.as_str()),
            Self::Reset { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Click { message, .. } | Self::Reset { message, .. } => message.as_deref(),
        }
    }
}

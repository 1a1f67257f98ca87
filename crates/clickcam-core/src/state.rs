//! Detector state as seen from outside the state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DomainError;

/// Lifecycle state of the click detector.
///
/// `Idle` accepts the next signal. `Suppressed` ignores signals until the
/// cooldown elapses and the detector resets itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionState {
    #[default]
    Idle,
    Suppressed,
}

impl DetectionState {
    /// Returns true when a new signal would produce a click.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Suppressed => "suppressed",
        }
    }
}

impl fmt::Display for DetectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "suppressed" => Ok(Self::Suppressed),
            other => Err(DomainError::InvalidFieldValue {
                field: "detection state".to_string(),
                value: other.to_string(),
                expected: "idle or suppressed".to_string(),
            }),
        }
    }
}

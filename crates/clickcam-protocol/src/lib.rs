//! clickcam Protocol - Wire formats for the relay channels
//!
//! This crate provides the JSON shapes sent to remote viewers:
//! - `/api/ws` carries [`EventMessage`] text frames
//! - `/api/video` carries raw encoded images (no envelope)
//! - `/api/status` answers with a [`StatusReport`]

pub mod channel;
pub mod message;
pub mod timestamp;

pub use channel::{EVENTS_PATH, STATUS_PATH, VIDEO_PATH};
pub use message::{DetectionReport, EventMessage, StatusReport};

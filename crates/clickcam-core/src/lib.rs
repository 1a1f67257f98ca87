//! clickcam Core - Shared types for click detection and video relay
//!
//! This crate provides the domain types shared between the daemon
//! (clickcamd) and the wire protocol (clickcam-protocol).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod event;
pub mod frame;
pub mod state;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use event::{DetectionEvent, DetectionKind, DetectionSignal, MouseButton, RESET_MESSAGE};
pub use frame::FrameBuffer;
pub use state::DetectionState;

//! clickcam Daemon - click detection and webcam relay server
//!
//! This crate provides the infrastructure for the clickcam daemon:
//! - `detector` - Detection state machine actor (idle / suppressed cooldown)
//! - `source` - Hardware observation feeding the detector
//! - `capture` - Supervised external capture process producing frames
//! - `subscribers` - Per-channel subscriber registries
//! - `router` - Fan-out from the detector and capture into the registries
//! - `server` - axum WebSocket/HTTP relay
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        clickcamd daemon                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────────┐  signal   ┌─────────────────┐  events      │
//! │  │ DetectionSource │──────────▶│  DetectorActor  │──────┐       │
//! │  └─────────────────┘           └─────────────────┘      ▼       │
//! │                                              ┌─────────────────┐│
//! │                                              │   EventRouter   ││
//! │                                              └────────┬────────┘│
//! │  ┌─────────────────┐  frames   ┌─────────────────┐    │         │
//! │  │   FrameSource   │──────────▶│   FrameRouter   │    │         │
//! │  │  (supervisor)   │           └────────┬────────┘    │         │
//! │  └─────────────────┘                    ▼             ▼         │
//! │                              ┌─────────────────────────────────┐│
//! │                              │  SubscriberRegistry (x2)        ││
//! │                              └────────────────┬────────────────┘│
//! │                                               ▼                 │
//! │                              ┌─────────────────────────────────┐│
//! │                              │ RelayServer / ConnectionHandler ││
//! │                              └─────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod capture;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod detector;
pub mod router;
pub mod server;
pub mod source;
pub mod subscribers;

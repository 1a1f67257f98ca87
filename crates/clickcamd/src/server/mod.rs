//! HTTP/WebSocket relay server.
//!
//! The server:
//! - Accepts WebSocket clients on the event and video channels
//! - Hands each socket to a `ConnectionHandler` bound to the channel's registry
//! - Serves a JSON status snapshot
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RelayServer   │
//! │  (axum Router)  │
//! └───────┬─────────┘
//!         │ upgrade
//!         ▼
//! ┌─────────────────┐     ┌────────────────────┐
//! │ConnectionHandler│────▶│ SubscriberRegistry │◀── routers
//! │   (per client)  │     │  (events | video)  │
//! └─────────────────┘     └────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A missing detector turns `/api/status` into a 503, not a crash

mod connection;

pub use connection::{ConnectionHandler, ConnectionState, Outbound};

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use clickcam_core::FrameBuffer;
use clickcam_protocol::{DetectionReport, StatusReport, EVENTS_PATH, STATUS_PATH, VIDEO_PATH};

use crate::capture::CaptureStats;
use crate::detector::DetectorHandle;
use crate::router::RelayStats;
use crate::subscribers::SubscriberRegistry;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub detector: DetectorHandle,
    pub events: SubscriberRegistry<String>,
    pub frames: SubscriberRegistry<FrameBuffer>,
    pub relay_stats: Arc<RelayStats>,
    /// `None` when capture is disabled
    pub capture_stats: Option<Arc<CaptureStats>>,
    /// Name of the active detection source, `none` if disabled
    pub source_name: &'static str,
}

/// Builds the status snapshot. `None` if the detector has stopped.
pub async fn status_report(state: &AppState) -> Option<StatusReport> {
    let status = state.detector.status().await?;

    Some(StatusReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        detection: DetectionReport {
            state: status.state,
            source: state.source_name.to_string(),
            last_click: status.last_click,
            clicks: status.clicks,
            suppressed_signals: status.suppressed_signals,
        },
        event_subscribers: state.events.len().await,
        video_subscribers: state.frames.len().await,
        frames_relayed: state.relay_stats.frames_relayed(),
        capture_restarts: state
            .capture_stats
            .as_ref()
            .map_or(0, |stats| stats.restarts()),
    })
}

/// Builds the axum router for the relay endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(EVENTS_PATH, get(events_handler))
        .route(VIDEO_PATH, get(video_handler))
        .route(STATUS_PATH, get(status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn events_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.events;
    ws.on_upgrade(move |socket| async move {
        ConnectionHandler::new(registry).run(socket).await;
    })
}

async fn video_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.frames;
    ws.on_upgrade(move |socket| async move {
        ConnectionHandler::new(registry).run(socket).await;
    })
}

async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusReport>, StatusCode> {
    match status_report(&state).await {
        Some(report) => Ok(Json(report)),
        None => {
            warn!("Status requested but detector is not running");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// HTTP server exposing the relay channels.
pub struct RelayServer {
    bind: SocketAddr,
    state: AppState,
    cancel_token: CancellationToken,
}

impl RelayServer {
    pub fn new(bind: SocketAddr, state: AppState, cancel_token: CancellationToken) -> Self {
        Self {
            bind,
            state,
            cancel_token,
        }
    }

    /// Binds the configured address and serves until cancelled.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.bind)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.bind,
                source,
            })?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr().map_err(ServerError::Serve)?;
        info!(addr = %addr, "Relay server listening");

        let token = self.cancel_token.clone();
        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .map_err(ServerError::Serve)?;

        // Upgraded sockets outlive the HTTP server; closing the queues ends them
        self.state.events.clear().await;
        self.state.frames.clear().await;

        info!("Relay server stopped");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] io::Error),
}

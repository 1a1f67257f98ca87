//! Video capture - external producer supervision.
//!
//! A [`FrameProducer`] yields one stream of frames per producer lifetime.
//! [`FrameSource`] owns the producer and keeps it alive: whenever the stream
//! ends or fails it logs the cause, waits a fixed delay and starts again.
//! Failures never reach the routers or the connected clients; they simply
//! see a gap in frames.

use std::io;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use clickcam_core::FrameBuffer;

mod codec;
mod producer;
mod supervisor;

pub use codec::MjpegFrameCodec;
pub use producer::CommandProducer;
pub use supervisor::{spawn_frame_source, CaptureStats, FrameSource};

/// Frames from a single producer lifetime.
pub type FrameStream = BoxStream<'static, Result<FrameBuffer, CaptureError>>;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("capture process exited with {status}")]
    Exited {
        status: String,
        /// Last non-empty line the process wrote to stderr
        stderr: Option<String>,
    },

    #[error("capture stream error: {0}")]
    Io(#[from] io::Error),

    #[error("capture process has no stdout")]
    MissingStdout,
}

impl CaptureError {
    /// Suggests a fix for common environment problems.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CaptureError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                Some("install the capture program or set capture.program")
            }
            CaptureError::Exited {
                stderr: Some(line), ..
            } if line.contains("No such file or directory") => {
                Some("check that the camera is connected and capture.device is correct")
            }
            CaptureError::Exited {
                stderr: Some(line), ..
            } if line.contains("Permission denied") => {
                Some("add the daemon user to the video group")
            }
            _ => None,
        }
    }
}

// ============================================================================
// Producer Trait
// ============================================================================

/// Something that produces encoded frames until it terminates.
#[async_trait]
pub trait FrameProducer: Send + Sync {
    /// Human readable description for logs.
    fn describe(&self) -> String;

    /// Starts one producer lifetime.
    async fn start(&self) -> Result<FrameStream, CaptureError>;
}

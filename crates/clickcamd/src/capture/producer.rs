//! External capture process.
//!
//! Runs the configured program (normally `ffmpeg`) with stdout piped and
//! cuts stdout into frames with [`MjpegFrameCodec`]. The child is killed
//! when the stream is dropped.

use std::process::Stdio;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::debug;

use super::{CaptureError, FrameProducer, FrameStream, MjpegFrameCodec};
use crate::config::{CaptureConfig, DEFAULT_MAX_FRAME_BYTES};

/// Spawns a capture command for each producer lifetime.
#[derive(Debug, Clone)]
pub struct CommandProducer {
    program: String,
    args: Vec<String>,
    max_frame_bytes: usize,
}

impl CommandProducer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.program.clone(), config.command_args())
            .with_max_frame_bytes(config.max_frame_bytes)
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }
}

/// Drains stderr, logging each line and keeping the last non-empty one.
async fn tail_stderr(stderr: ChildStderr) -> Option<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut last = None;

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        debug!(line = %line, "Capture stderr");
        last = Some(line.to_string());
    }

    last
}

struct RunState {
    frames: FramedRead<ChildStdout, MjpegFrameCodec>,
    child: Child,
    stderr_tail: Option<JoinHandle<Option<String>>>,
    done: bool,
}

impl RunState {
    /// Reaps the child once stdout is exhausted.
    async fn finish(&mut self) -> Result<(), CaptureError> {
        let status = self.child.wait().await?;

        let stderr = match self.stderr_tail.take() {
            Some(task) => task.await.ok().flatten(),
            None => None,
        };

        if status.success() {
            debug!("Capture process exited cleanly");
            Ok(())
        } else {
            Err(CaptureError::Exited {
                status: status.to_string(),
                stderr,
            })
        }
    }
}

#[async_trait]
impl FrameProducer for CommandProducer {
    fn describe(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }

    async fn start(&self) -> Result<FrameStream, CaptureError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(CaptureError::MissingStdout)?;
        let stderr_tail = child.stderr.take().map(|s| tokio::spawn(tail_stderr(s)));

        debug!(pid = ?child.id(), program = %self.program, "Capture process spawned");

        let state = RunState {
            frames: FramedRead::new(stdout, MjpegFrameCodec::new(self.max_frame_bytes)),
            child,
            stderr_tail,
            done: false,
        };

        let frames = stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }

            match state.frames.next().await {
                Some(Ok(frame)) => Some((Ok(frame), state)),
                Some(Err(e)) => {
                    state.done = true;
                    Some((Err(e), state))
                }
                None => {
                    state.done = true;
                    match state.finish().await {
                        Ok(()) => None,
                        Err(e) => Some((Err(e), state)),
                    }
                }
            }
        });

        Ok(frames.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_uses_command_args() {
        let config = CaptureConfig::default();
        let producer = CommandProducer::from_config(&config);

        assert_eq!(producer.program, "ffmpeg");
        assert_eq!(producer.args, config.command_args());
        assert_eq!(producer.max_frame_bytes, config.max_frame_bytes);
        assert!(producer.describe().starts_with("ffmpeg "));
    }

    #[tokio::test]
    async fn test_spawn_failure_reports_program() {
        let producer = CommandProducer::new("/nonexistent/clickcam-capture", vec![]);

        match producer.start().await {
            Err(err @ CaptureError::Spawn { .. }) => {
                assert!(err.to_string().contains("/nonexistent/clickcam-capture"));
                assert!(err.hint().is_some());
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("spawn should fail"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_frames_from_process_stdout() {
        let producer = CommandProducer::new(
            "sh",
            vec![
                "-c".to_string(),
                r"printf 'noise\377\330one\377\331\377\330two\377\331'".to_string(),
            ],
        );

        let frames: Vec<_> = producer.start().await.unwrap().collect().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[0].as_ref().unwrap().as_bytes(),
            b"\xFF\xD8one\xFF\xD9"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let producer = CommandProducer::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo '/dev/video0: Permission denied' >&2; exit 1".to_string(),
            ],
        );

        let results: Vec<_> = producer.start().await.unwrap().collect().await;
        match results.as_slice() {
            [Err(err @ CaptureError::Exited { stderr, .. })] => {
                assert_eq!(stderr.as_deref(), Some("/dev/video0: Permission denied"));
                assert!(err.hint().is_some());
            }
            other => panic!("unexpected results: {other:?}"),
        }
    }
}

//! Restart-on-failure supervision of a frame producer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use clickcam_core::FrameBuffer;

use super::{CaptureError, FrameProducer};

/// Capture counters shared with the status endpoint.
#[derive(Debug, Default)]
pub struct CaptureStats {
    restarts: AtomicU64,
    frames_captured: AtomicU64,
}

impl CaptureStats {
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }
}

/// How one producer lifetime ended.
enum Lifetime {
    Ended,
    Failed(CaptureError),
    SinkClosed,
}

/// Keeps a [`FrameProducer`] running, restarting it after a fixed delay.
pub struct FrameSource<P> {
    producer: P,
    restart_delay: Duration,
    stats: Arc<CaptureStats>,
}

impl<P: FrameProducer> FrameSource<P> {
    pub fn new(producer: P, restart_delay: Duration) -> Self {
        Self {
            producer,
            restart_delay,
            stats: Arc::new(CaptureStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }

    /// Forwards frames into `sink` until cancelled or the sink closes.
    pub async fn run(self, sink: mpsc::Sender<FrameBuffer>, cancel: CancellationToken) {
        info!(command = %self.producer.describe(), "Frame capture started");

        loop {
            let lifetime = tokio::select! {
                _ = cancel.cancelled() => break,
                lifetime = self.capture_once(&sink) => lifetime,
            };

            match lifetime {
                Lifetime::SinkClosed => {
                    debug!("Frame sink closed, capture stopping");
                    break;
                }
                Lifetime::Failed(e) => {
                    warn!(
                        error = %e,
                        hint = e.hint().unwrap_or("none"),
                        retry_secs = self.restart_delay.as_secs(),
                        "Capture failed"
                    );
                }
                Lifetime::Ended => {
                    warn!(
                        retry_secs = self.restart_delay.as_secs(),
                        "Capture process ended"
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.restart_delay) => {}
            }

            let restarts = self.stats.restarts.fetch_add(1, Ordering::Relaxed) + 1;
            info!(restarts, "Restarting capture");
        }

        debug!("Frame capture stopped");
    }

    async fn capture_once(&self, sink: &mpsc::Sender<FrameBuffer>) -> Lifetime {
        let mut frames = match self.producer.start().await {
            Ok(frames) => frames,
            Err(e) => return Lifetime::Failed(e),
        };

        while let Some(item) = frames.next().await {
            match item {
                Ok(frame) => {
                    self.stats.frames_captured.fetch_add(1, Ordering::Relaxed);
                    if sink.send(frame).await.is_err() {
                        return Lifetime::SinkClosed;
                    }
                }
                Err(e) => return Lifetime::Failed(e),
            }
        }

        Lifetime::Ended
    }
}

/// Spawns a frame source on its own task.
pub fn spawn_frame_source<P>(
    source: FrameSource<P>,
    sink: mpsc::Sender<FrameBuffer>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    P: FrameProducer + 'static,
{
    tokio::spawn(source.run(sink, cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameStream;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Mutex;

    /// Replays one scripted lifetime per `start()` call.
    struct Scripted {
        lifetimes: Mutex<Vec<Vec<Result<FrameBuffer, CaptureError>>>>,
    }

    impl Scripted {
        fn new(mut lifetimes: Vec<Vec<Result<FrameBuffer, CaptureError>>>) -> Self {
            lifetimes.reverse();
            Self {
                lifetimes: Mutex::new(lifetimes),
            }
        }
    }

    #[async_trait]
    impl FrameProducer for Scripted {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        async fn start(&self) -> Result<FrameStream, CaptureError> {
            let next = self.lifetimes.lock().unwrap().pop();
            match next {
                Some(items) => Ok(stream::iter(items).boxed()),
                // Out of script: stay silent forever
                None => Ok(stream::pending().boxed()),
            }
        }
    }

    fn exit_failure() -> CaptureError {
        CaptureError::Exited {
            status: "exit status: 1".to_string(),
            stderr: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_after_delay() {
        let producer = Scripted::new(vec![
            vec![Err(exit_failure())],
            vec![Ok(FrameBuffer::from(&b"frame"[..]))],
        ]);
        let source = FrameSource::new(producer, Duration::from_secs(5));
        let stats = source.stats();
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let start = tokio::time::Instant::now();
        let task = spawn_frame_source(source, tx, cancel.clone());

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.as_bytes(), b"frame");
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(stats.restarts(), 1);
        assert_eq!(stats.frames_captured(), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_sink_closed() {
        let producer = Scripted::new(vec![vec![
            Ok(FrameBuffer::from(&b"a"[..])),
            Ok(FrameBuffer::from(&b"b"[..])),
        ]]);
        let source = FrameSource::new(producer, Duration::from_secs(5));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        // Returns instead of restarting forever
        source.run(tx, CancellationToken::new()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let producer = Scripted::new(vec![vec![Err(exit_failure())]]);
        let source = FrameSource::new(producer, Duration::from_secs(5));
        let stats = source.stats();
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let task = spawn_frame_source(source, tx, cancel.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(stats.restarts(), 0);
    }
}

//! Device-directory source - signals when a new input device appears.
//!
//! Counts the entries of a directory (normally `/dev/input`) whose names
//! start with a prefix (normally `event`) once per poll interval. A rising
//! count means something was plugged in.
//!
//! # Async Safety
//!
//! Directory reads run via `spawn_blocking` to avoid blocking the runtime.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use clickcam_core::{DetectionSignal, MouseButton};

use super::{DetectionSource, SourceError};
use crate::detector::DetectorHandle;

/// Counts directory entries whose file name starts with `prefix`.
///
/// Blocking; call from `spawn_blocking`.
pub fn count_devices(dir: &Path, prefix: &str) -> Result<usize, SourceError> {
    let entries = fs::read_dir(dir).map_err(|e| SourceError::Read {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .count())
}

/// Tracks the device count between polls.
///
/// The first observation only sets the baseline; devices already present
/// at startup never trigger.
#[derive(Debug, Clone, Default)]
pub struct DeviceCounter {
    previous: Option<usize>,
}

impl DeviceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a count; returns it if it grew since the previous one.
    pub fn observe(&mut self, count: usize) -> Option<usize> {
        let grew = matches!(self.previous, Some(prev) if count > prev);
        self.previous = Some(count);
        grew.then_some(count)
    }

    pub fn previous(&self) -> Option<usize> {
        self.previous
    }
}

/// Polls a device directory for new entries.
pub struct DeviceDirectorySource {
    dir: PathBuf,
    prefix: String,
    poll_interval: Duration,
    counter: DeviceCounter,
}

impl DeviceDirectorySource {
    pub fn new(dir: PathBuf, prefix: String, poll_interval: Duration) -> Self {
        Self {
            dir,
            prefix,
            poll_interval,
            counter: DeviceCounter::new(),
        }
    }

    async fn poll(&self) -> Result<usize, SourceError> {
        let dir = self.dir.clone();
        let prefix = self.prefix.clone();

        tokio::task::spawn_blocking(move || count_devices(&dir, &prefix))
            .await
            .map_err(|e| SourceError::Task(e.to_string()))?
    }
}

#[async_trait]
impl DetectionSource for DeviceDirectorySource {
    fn name(&self) -> &'static str {
        "device_directory"
    }

    async fn run(mut self: Box<Self>, detector: DetectorHandle, cancel: CancellationToken) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            dir = %self.dir.display(),
            prefix = %self.prefix,
            interval_ms = self.poll_interval.as_millis() as u64,
            "Watching for new input devices"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {}
            }

            let count = match self.poll().await {
                Ok(count) => count,
                Err(e) => {
                    // Retried on the next tick
                    warn!(error = %e, "Failed to scan device directory");
                    continue;
                }
            };

            if self.counter.previous().is_none() {
                debug!(devices = count, "Initial device count");
            }

            // The baseline also moves during the detector's cooldown, so a
            // device plugged in while suppressed never fires after the reset.
            if let Some(total) = self.counter.observe(count) {
                info!(devices = total, "New input device connected");
                let signal = DetectionSignal::new()
                    .with_button(MouseButton::Left)
                    .with_message(format!("New input device connected ({total} total)"));

                if detector.signal(signal).await.is_err() {
                    debug!("Detector stopped, device watcher exiting");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clickcam_core::DetectionEvent;
    use tokio::sync::broadcast;
    use tokio::task::JoinHandle;
    use tokio::time::{sleep, timeout};

    use crate::detector::{spawn_detector, RearmPolicy};
    use crate::source::spawn_source;

    const POLL: Duration = Duration::from_millis(20);

    struct Watcher {
        detector: DetectorHandle,
        events: broadcast::Receiver<DetectionEvent>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    }

    fn watch(dir: &Path, cooldown: Duration) -> Watcher {
        let detector = spawn_detector(cooldown, RearmPolicy::Ignore);
        let events = detector.subscribe();
        let cancel = CancellationToken::new();
        let source = DeviceDirectorySource::new(dir.to_path_buf(), "event".to_string(), POLL);
        let task = spawn_source(Box::new(source), detector.clone(), cancel.clone());

        Watcher {
            detector,
            events,
            cancel,
            task,
        }
    }

    /// Moves a prepared directory into place in one step.
    fn install_dir(root: &Path, dir: &Path, devices: &[&str]) {
        let staging = root.join("staging");
        fs::create_dir(&staging).unwrap();
        for name in devices {
            fs::write(staging.join(name), b"").unwrap();
        }
        fs::rename(&staging, dir).unwrap();
    }

    async fn next_event(events: &mut broadcast::Receiver<DetectionEvent>) -> DetectionEvent {
        timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event within timeout")
            .unwrap()
    }

    #[test]
    fn test_counter_first_observation_is_baseline() {
        let mut counter = DeviceCounter::new();
        assert_eq!(counter.observe(5), None);
        assert_eq!(counter.previous(), Some(5));
    }

    #[test]
    fn test_counter_reports_growth_only() {
        let mut counter = DeviceCounter::new();
        counter.observe(3);

        assert_eq!(counter.observe(4), Some(4));
        assert_eq!(counter.observe(4), None);
        assert_eq!(counter.observe(2), None);
        // Growth is measured against the latest count, not the peak
        assert_eq!(counter.observe(3), Some(3));
    }

    #[test]
    fn test_count_devices_filters_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["event0", "event1", "mice", "mouse0"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        assert_eq!(count_devices(dir.path(), "event").unwrap(), 2);
        assert_eq!(count_devices(dir.path(), "mouse").unwrap(), 1);
    }

    #[test]
    fn test_count_devices_missing_dir() {
        let err = count_devices(Path::new("/nonexistent/input"), "event").unwrap_err();
        assert!(matches!(err, SourceError::Read { .. }));
    }

    #[tokio::test]
    async fn test_run_retries_missing_dir_then_signals_new_device() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("input");
        let mut watcher = watch(&dir, Duration::from_secs(60));

        // Scans fail while the directory is missing
        sleep(POLL * 5).await;

        // Devices present when the directory appears only set the baseline
        install_dir(root.path(), &dir, &["event0"]);
        sleep(POLL * 5).await;
        assert!(watcher.events.try_recv().is_err());
        assert_eq!(watcher.detector.status().await.unwrap().clicks, 0);

        fs::write(dir.join("event1"), b"").unwrap();
        match next_event(&mut watcher.events).await {
            DetectionEvent::Click {
                button, message, ..
            } => {
                assert_eq!(button, MouseButton::Left);
                assert_eq!(
                    message.as_deref(),
                    Some("New input device connected (2 total)")
                );
            }
            other => panic!("expected click, got {other:?}"),
        }

        watcher.cancel.cancel();
        watcher.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_device_added_during_cooldown_is_absorbed() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("input");
        install_dir(root.path(), &dir, &["event0"]);
        let mut watcher = watch(&dir, Duration::from_millis(200));
        sleep(POLL * 5).await;

        fs::write(dir.join("event1"), b"").unwrap();
        assert!(matches!(
            next_event(&mut watcher.events).await,
            DetectionEvent::Click { .. }
        ));

        fs::write(dir.join("event2"), b"").unwrap();
        assert!(matches!(
            next_event(&mut watcher.events).await,
            DetectionEvent::Reset { .. }
        ));

        // The new baseline already includes event2
        assert!(timeout(POLL * 10, watcher.events.recv()).await.is_err());

        watcher.cancel.cancel();
        watcher.task.await.unwrap();
    }
}

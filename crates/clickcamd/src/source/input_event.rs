//! Input-event source - signals on physical mouse button presses.
//!
//! Reads the legacy PS/2 mouse stream (`/dev/input/mice`), which every
//! Linux kernel exposes for all connected mice combined. Each packet is
//! three bytes:
//!
//! ```text
//! byte 0: Y overflow | X overflow | Y sign | X sign | 1 | middle | right | left
//! byte 1: X movement
//! byte 2: Y movement
//! ```
//!
//! Bit 3 of the first byte is always set and is used to resynchronise
//! after a partial read.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use clickcam_core::{DetectionSignal, MouseButton};

use super::{DetectionSource, SourceError};
use crate::detector::DetectorHandle;

const PACKET_LEN: usize = 3;
const SYNC_BIT: u8 = 0b0000_1000;
const READ_BUFFER: usize = 64;

/// Decodes PS/2 mouse packets into button presses.
///
/// Only press transitions are reported; holding a button down or moving
/// the mouse produces nothing.
#[derive(Debug, Default)]
pub struct PacketDecoder {
    pending: Vec<u8>,
    pressed: u8,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes, returning buttons that went from released to pressed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<MouseButton> {
        self.pending.extend_from_slice(bytes);
        let mut presses = Vec::new();

        loop {
            // Drop bytes until the first one looks like a packet header
            match self.pending.first() {
                None => break,
                Some(header) if header & SYNC_BIT == 0 => {
                    self.pending.remove(0);
                    continue;
                }
                Some(_) => {}
            }

            if self.pending.len() < PACKET_LEN {
                break;
            }

            let packet: Vec<u8> = self.pending.drain(..PACKET_LEN).collect();
            if let [header, _, _] = packet.as_slice() {
                presses.extend(self.transition(*header));
            }
        }

        presses
    }

    fn transition(&mut self, header: u8) -> Vec<MouseButton> {
        let buttons = header & 0b0000_0111;
        let newly_pressed = buttons & !self.pressed;
        self.pressed = buttons;

        MouseButton::ALL
            .into_iter()
            .enumerate()
            .filter(|(bit, _)| newly_pressed & (1u8 << bit) != 0)
            .map(|(_, button)| button)
            .collect()
    }
}

/// Watches the mouse device for button presses.
pub struct InputEventSource {
    device: PathBuf,
    retry_interval: Duration,
}

impl InputEventSource {
    pub fn new(device: PathBuf, retry_interval: Duration) -> Self {
        Self {
            device,
            retry_interval,
        }
    }

    async fn open(&self) -> Result<File, SourceError> {
        File::open(&self.device)
            .await
            .map_err(|e| SourceError::Open {
                path: self.device.clone(),
                message: e.to_string(),
            })
    }

    /// Reads until cancelled, the device fails, or the detector stops.
    ///
    /// `Ok(true)` means the detector is gone and the source should exit.
    async fn read_device(
        &self,
        file: &mut File,
        detector: &DetectorHandle,
        cancel: &CancellationToken,
    ) -> Result<bool, SourceError> {
        let mut decoder = PacketDecoder::new();
        let mut buf = [0u8; READ_BUFFER];

        loop {
            let n = tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                read = file.read(&mut buf) => read.map_err(|e| SourceError::Read {
                    path: self.device.clone(),
                    message: e.to_string(),
                })?,
            };

            if n == 0 {
                return Err(SourceError::Eof {
                    path: self.device.clone(),
                });
            }

            let Some(chunk) = buf.get(..n) else {
                continue;
            };

            for button in decoder.push(chunk) {
                debug!(button = %button, "Mouse button pressed");
                let signal = DetectionSignal::new().with_button(button);
                if detector.signal(signal).await.is_err() {
                    return Ok(true);
                }
            }
        }
    }
}

#[async_trait]
impl DetectionSource for InputEventSource {
    fn name(&self) -> &'static str {
        "input_events"
    }

    async fn run(self: Box<Self>, detector: DetectorHandle, cancel: CancellationToken) {
        info!(device = %self.device.display(), "Watching for mouse button presses");

        while !cancel.is_cancelled() {
            let result = match self.open().await {
                Ok(mut file) => self.read_device(&mut file, &detector, &cancel).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(true) => {
                    debug!("Detector stopped, input watcher exiting");
                    break;
                }
                Ok(false) => break,
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_ms = self.retry_interval.as_millis() as u64,
                        "Mouse device unavailable, retrying"
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clickcam_core::DetectionEvent;
    use tokio::time::{sleep, timeout};

    use crate::detector::{spawn_detector, RearmPolicy};
    use crate::source::spawn_source;

    const RETRY: Duration = Duration::from_millis(20);

    #[test]
    fn test_decode_left_press() {
        let mut decoder = PacketDecoder::new();
        assert_eq!(decoder.push(&[0x09, 0x00, 0x00]), vec![MouseButton::Left]);
    }

    #[test]
    fn test_held_button_reports_once() {
        let mut decoder = PacketDecoder::new();
        assert_eq!(decoder.push(&[0x09, 0x00, 0x00]), vec![MouseButton::Left]);
        // Still held while moving
        assert!(decoder.push(&[0x09, 0x05, 0x02]).is_empty());
        // Released, then pressed again
        assert!(decoder.push(&[0x08, 0x00, 0x00]).is_empty());
        assert_eq!(decoder.push(&[0x09, 0x00, 0x00]), vec![MouseButton::Left]);
    }

    #[test]
    fn test_multiple_buttons_in_one_packet() {
        let mut decoder = PacketDecoder::new();
        assert_eq!(
            decoder.push(&[0x0E, 0x00, 0x00]),
            vec![MouseButton::Right, MouseButton::Middle]
        );
    }

    #[test]
    fn test_packet_split_across_reads() {
        let mut decoder = PacketDecoder::new();
        assert!(decoder.push(&[0x0A]).is_empty());
        assert!(decoder.push(&[0x00]).is_empty());
        assert_eq!(decoder.push(&[0x00]), vec![MouseButton::Right]);
    }

    #[test]
    fn test_resync_skips_bytes_without_sync_bit() {
        let mut decoder = PacketDecoder::new();
        // Two stray movement bytes, then a valid packet
        assert_eq!(
            decoder.push(&[0x01, 0x02, 0x09, 0x00, 0x00]),
            vec![MouseButton::Left]
        );
    }

    #[test]
    fn test_movement_only_produces_nothing() {
        let mut decoder = PacketDecoder::new();
        assert!(decoder.push(&[0x08, 0x10, 0xF0, 0x18, 0x01, 0x01]).is_empty());
    }

    #[tokio::test]
    async fn test_run_signals_press_and_reopens_after_eof() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("mice");
        std::fs::write(&device, [0x09, 0x00, 0x00]).unwrap();

        let detector = spawn_detector(Duration::from_secs(60), RearmPolicy::Ignore);
        let mut events = detector.subscribe();
        let cancel = CancellationToken::new();
        let source = InputEventSource::new(device, RETRY);
        let task = spawn_source(Box::new(source), detector.clone(), cancel.clone());

        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("click within timeout")
            .unwrap();
        assert_eq!(event.label(), Some("left"));

        // Each reopen replays the packet, which the cooldown swallows
        let mut suppressed = 0;
        for _ in 0..250 {
            suppressed = detector.status().await.unwrap().suppressed_signals;
            if suppressed >= 2 {
                break;
            }
            sleep(RETRY).await;
        }
        assert!(suppressed >= 2);
        assert_eq!(detector.status().await.unwrap().clicks, 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_retries_until_device_exists() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("mice");

        let detector = spawn_detector(Duration::from_secs(60), RearmPolicy::Ignore);
        let mut events = detector.subscribe();
        let cancel = CancellationToken::new();
        let source = InputEventSource::new(device.clone(), RETRY);
        let task = spawn_source(Box::new(source), detector.clone(), cancel.clone());

        sleep(RETRY * 5).await;
        assert!(events.try_recv().is_err());

        std::fs::write(&device, [0x0A, 0x00, 0x00]).unwrap();
        match timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap() {
            DetectionEvent::Click { button, .. } => assert_eq!(button, MouseButton::Right),
            other => panic!("expected click, got {other:?}"),
        }

        cancel.cancel();
        task.await.unwrap();
    }
}

//! Detector actor - owns the detection state and processes signals.
//!
//! The DetectorActor is the single writer of the idle/suppressed state and
//! the pending reset deadline. Signals arrive via an mpsc channel; events are
//! published via broadcast.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel send failures are ignored or logged, never fatal

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use clickcam_core::{DetectionEvent, DetectionSignal, DetectionState};

use super::commands::{DetectionStatus, DetectorCommand};
use super::RearmPolicy;

/// Internal lifecycle. The reset deadline lives inside `Suppressed`, so
/// there is exactly one pending reset while suppressed and none while idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Suppressed { reset_at: Instant },
}

/// The detector actor - owns all detection state.
///
/// Processes commands sequentially in a single task. The auto-reset is a
/// deadline polled by the same loop rather than a separately spawned timer,
/// so re-arming and firing can never race each other.
pub struct DetectorActor {
    /// Command receiver
    receiver: mpsc::Receiver<DetectorCommand>,

    /// Event publisher for the event router
    event_publisher: broadcast::Sender<DetectionEvent>,

    /// How long to stay suppressed after a click
    cooldown: Duration,

    rearm: RearmPolicy,

    phase: Phase,

    last_click: Option<DateTime<Utc>>,
    clicks: u64,
    suppressed_signals: u64,
}

impl DetectorActor {
    /// Creates a new detector actor in the `Idle` state.
    pub fn new(
        receiver: mpsc::Receiver<DetectorCommand>,
        event_publisher: broadcast::Sender<DetectionEvent>,
        cooldown: Duration,
        rearm: RearmPolicy,
    ) -> Self {
        Self {
            receiver,
            event_publisher,
            cooldown,
            rearm,
            phase: Phase::Idle,
            last_click: None,
            clicks: 0,
            suppressed_signals: 0,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!(
            cooldown_secs = self.cooldown.as_secs_f64(),
            rearm = %self.rearm,
            "Detector actor starting"
        );

        loop {
            let reset_at = self.reset_deadline();

            tokio::select! {
                // A due reset wins over queued signals so a signal landing
                // exactly on the deadline starts a fresh cycle.
                biased;

                _ = wait_for_reset(reset_at) => {
                    self.handle_timeout();
                }

                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => break,
                    }
                }
            }
        }

        info!(clicks = self.clicks, "Detector actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: DetectorCommand) {
        match cmd {
            DetectorCommand::Signal(signal) => self.handle_signal(signal),
            DetectorCommand::GetStatus { respond_to } => {
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(self.status());
            }
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Handles a raw signal.
    ///
    /// Idle: emit a click and arm the reset. Suppressed: count it and, with
    /// `RearmPolicy::Extend`, push the deadline back.
    fn handle_signal(&mut self, signal: DetectionSignal) {
        match self.phase {
            Phase::Idle => {
                let reset_at = Instant::now() + self.cooldown;
                self.phase = Phase::Suppressed { reset_at };

                let event = DetectionEvent::click(signal, Utc::now());
                self.clicks += 1;
                self.last_click = Some(event.timestamp());

                info!(
                    button = event.label().unwrap_or("unknown"),
                    message = event.message().unwrap_or_default(),
                    cooldown_secs = self.cooldown.as_secs_f64(),
                    "Click detected, suppressing further signals"
                );

                // Publish event (ignore if no subscribers)
                let _ = self.event_publisher.send(event);
            }
            Phase::Suppressed { reset_at } => {
                self.suppressed_signals += 1;

                match self.rearm {
                    RearmPolicy::Ignore => {
                        debug!(
                            remaining_ms = reset_at
                                .saturating_duration_since(Instant::now())
                                .as_millis() as u64,
                            "Signal ignored during cooldown"
                        );
                    }
                    RearmPolicy::Extend => {
                        self.phase = Phase::Suppressed {
                            reset_at: Instant::now() + self.cooldown,
                        };
                        debug!("Signal during cooldown, reset deadline extended");
                    }
                }
            }
        }
    }

    /// Handles expiry of the reset deadline.
    fn handle_timeout(&mut self) {
        if let Phase::Suppressed { .. } = self.phase {
            self.phase = Phase::Idle;
            info!("Cooldown elapsed, detector listening again");
            let _ = self.event_publisher.send(DetectionEvent::reset(Utc::now()));
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn reset_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Idle => None,
            Phase::Suppressed { reset_at } => Some(reset_at),
        }
    }

    /// Returns the externally visible state.
    pub fn state(&self) -> DetectionState {
        match self.phase {
            Phase::Idle => DetectionState::Idle,
            Phase::Suppressed { .. } => DetectionState::Suppressed,
        }
    }

    fn status(&self) -> DetectionStatus {
        DetectionStatus {
            state: self.state(),
            reset_in: self
                .reset_deadline()
                .map(|at| at.saturating_duration_since(Instant::now())),
            last_click: self.last_click,
            clicks: self.clicks,
            suppressed_signals: self.suppressed_signals,
        }
    }
}

/// Resolves at the deadline, or never if there is none.
async fn wait_for_reset(reset_at: Option<Instant>) {
    match reset_at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clickcam_core::{DetectionKind, MouseButton};
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::sync::oneshot;

    const COOLDOWN: Duration = Duration::from_secs(10);

    fn create_actor(
        rearm: RearmPolicy,
    ) -> (
        mpsc::Sender<DetectorCommand>,
        DetectorActor,
        broadcast::Receiver<DetectionEvent>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = broadcast::channel(16);
        let actor = DetectorActor::new(cmd_rx, event_tx, COOLDOWN, rearm);
        (cmd_tx, actor, event_rx)
    }

    #[tokio::test]
    async fn test_signal_from_idle_emits_click() {
        let (_, mut actor, mut event_rx) = create_actor(RearmPolicy::Ignore);

        actor.handle_command(DetectorCommand::Signal(
            DetectionSignal::new().with_button(MouseButton::Middle),
        ));

        assert_eq!(actor.state(), DetectionState::Suppressed);
        let event = event_rx.try_recv().unwrap();
        assert_eq!(event.kind(), DetectionKind::Click);
        assert_eq!(event.label(), Some("middle"));
        assert!(actor.reset_deadline().is_some());
    }

    #[tokio::test]
    async fn test_burst_collapses_to_one_click() {
        let (_, mut actor, mut event_rx) = create_actor(RearmPolicy::Ignore);

        for _ in 0..25 {
            actor.handle_signal(DetectionSignal::new());
        }

        assert!(event_rx.try_recv().is_ok());
        assert!(matches!(event_rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(actor.clicks, 1);
        assert_eq!(actor.suppressed_signals, 24);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignore_policy_keeps_deadline() {
        let (_, mut actor, _rx) = create_actor(RearmPolicy::Ignore);

        actor.handle_signal(DetectionSignal::new());
        let first = actor.reset_deadline();

        tokio::time::advance(Duration::from_secs(4)).await;
        actor.handle_signal(DetectionSignal::new());

        assert_eq!(actor.reset_deadline(), first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_policy_moves_deadline() {
        let (_, mut actor, _rx) = create_actor(RearmPolicy::Extend);

        actor.handle_signal(DetectionSignal::new());
        let first = actor.reset_deadline().unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        actor.handle_signal(DetectionSignal::new());

        let second = actor.reset_deadline().unwrap();
        assert_eq!(second - first, Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_timeout_returns_to_idle_and_emits_reset() {
        let (_, mut actor, mut event_rx) = create_actor(RearmPolicy::Ignore);

        actor.handle_signal(DetectionSignal::new());
        let _click = event_rx.try_recv().unwrap();

        actor.handle_timeout();

        assert_eq!(actor.state(), DetectionState::Idle);
        assert!(actor.reset_deadline().is_none());
        let reset = event_rx.try_recv().unwrap();
        assert_eq!(reset.kind(), DetectionKind::Reset);
    }

    #[tokio::test]
    async fn test_timeout_while_idle_is_noop() {
        let (_, mut actor, mut event_rx) = create_actor(RearmPolicy::Ignore);

        actor.handle_timeout();

        assert_eq!(actor.state(), DetectionState::Idle);
        assert!(matches!(event_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_get_status() {
        let (_, mut actor, _rx) = create_actor(RearmPolicy::Ignore);
        actor.handle_signal(DetectionSignal::new());
        actor.handle_signal(DetectionSignal::new());

        let (tx, rx) = oneshot::channel();
        actor.handle_command(DetectorCommand::GetStatus { respond_to: tx });

        let status = rx.await.unwrap();
        assert_eq!(status.state, DetectionState::Suppressed);
        assert_eq!(status.clicks, 1);
        assert_eq!(status.suppressed_signals, 1);
        assert!(status.last_click.is_some());
        assert!(status.reset_in.unwrap() <= COOLDOWN);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_fail() {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let (event_tx, _) = broadcast::channel(4);
        let mut actor = DetectorActor::new(cmd_rx, event_tx, COOLDOWN, RearmPolicy::Ignore);

        actor.handle_signal(DetectionSignal::new());
        actor.handle_timeout();

        assert_eq!(actor.clicks, 1);
        drop(cmd_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_fires_reset_after_cooldown() {
        let (cmd_tx, actor, mut event_rx) = create_actor(RearmPolicy::Ignore);
        tokio::spawn(actor.run());

        let start = Instant::now();
        cmd_tx
            .send(DetectorCommand::Signal(DetectionSignal::new()))
            .await
            .unwrap();

        let click = event_rx.recv().await.unwrap();
        assert_eq!(click.kind(), DetectionKind::Click);

        let reset = event_rx.recv().await.unwrap();
        assert_eq!(reset.kind(), DetectionKind::Reset);
        assert!(start.elapsed() >= COOLDOWN);
        assert!(start.elapsed() < COOLDOWN + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_stops_when_senders_dropped() {
        let (cmd_tx, actor, _rx) = create_actor(RearmPolicy::Ignore);
        let task = tokio::spawn(actor.run());

        drop(cmd_tx);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("actor should stop")
            .unwrap();
    }
}

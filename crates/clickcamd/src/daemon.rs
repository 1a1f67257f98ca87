//! Daemon wiring - spawns every pipeline and runs the relay server.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::{spawn_frame_source, CommandProducer, FrameSource};
use crate::config::Config;
use crate::detector::spawn_detector;
use crate::router::{spawn_event_router, spawn_frame_router, RelayStats};
use crate::server::{AppState, RelayServer, ServerError};
use crate::source::{self, spawn_source};
use crate::subscribers::SubscriberRegistry;

/// Buffer between the capture supervisor and the frame router
const FRAME_SINK_BUFFER: usize = 4;

/// Name reported for the detection source when detection is disabled
const NO_SOURCE: &str = "none";

/// The running pipelines behind a relay server.
pub struct Pipelines {
    pub state: AppState,
    pub tasks: Vec<JoinHandle<()>>,
}

/// Spawns the detector, detection source, capture supervisor and routers.
///
/// Every background task stops when `cancel` is triggered.
pub fn spawn_pipelines(config: &Config, cancel: &CancellationToken) -> Pipelines {
    let mut tasks = Vec::new();

    let detector = spawn_detector(config.detection.cooldown(), config.detection.rearm);
    info!(
        cooldown_secs = config.detection.cooldown_secs,
        rearm = %config.detection.rearm,
        "Detector started"
    );

    let source_name = match source::from_config(&config.detection) {
        Some(source) => {
            let name = source.name();
            tasks.push(spawn_source(source, detector.clone(), cancel.clone()));
            name
        }
        None => {
            info!("Hardware detection disabled");
            NO_SOURCE
        }
    };

    let events = SubscriberRegistry::new(
        "events",
        config.server.event_queue,
        config.server.max_subscribers,
    );
    let frames = SubscriberRegistry::new(
        "video",
        config.server.frame_queue,
        config.server.max_subscribers,
    );
    let relay_stats = Arc::new(RelayStats::default());

    tasks.push(spawn_event_router(
        &detector,
        events.clone(),
        Arc::clone(&relay_stats),
        cancel.clone(),
    ));

    let capture_stats = if config.capture.enabled {
        let (sink, frame_rx) = mpsc::channel(FRAME_SINK_BUFFER);
        let capture = FrameSource::new(
            CommandProducer::from_config(&config.capture),
            config.capture.restart_delay(),
        );
        let stats = capture.stats();

        tasks.push(spawn_frame_source(capture, sink, cancel.clone()));
        tasks.push(spawn_frame_router(
            frame_rx,
            frames.clone(),
            Arc::clone(&relay_stats),
            cancel.clone(),
        ));
        Some(stats)
    } else {
        info!("Video capture disabled");
        None
    };

    Pipelines {
        state: AppState {
            detector,
            events,
            frames,
            relay_stats,
            capture_stats,
            source_name,
        },
        tasks,
    }
}

/// Runs the whole daemon until `cancel` is triggered or the server fails.
pub async fn run(config: Config, cancel: CancellationToken) -> Result<(), ServerError> {
    let pipelines = spawn_pipelines(&config, &cancel);
    let server = RelayServer::new(config.server.bind, pipelines.state, cancel.clone());

    let result = server.run().await;

    // A bind failure must still stop the pipelines
    cancel.cancel();
    for task in pipelines.tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Pipeline task ended abnormally");
        }
    }

    result
}

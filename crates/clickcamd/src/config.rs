//! Daemon configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no
//! file at all) yields a working setup: device-directory detection on
//! `/dev/input`, ffmpeg capture from `/dev/video0`, listening on port 3000.
//!
//! Resolution order for the file:
//! 1. `--config <path>` on the command line
//! 2. `$CLICKCAM_CONFIG`
//! 3. `<config dir>/clickcam/config.toml`, if it exists
//!
//! `$CLICKCAM_BIND` overrides the listen address after the file is read.

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::detector::RearmPolicy;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CLICKCAM_CONFIG";

/// Environment variable overriding `server.bind`.
pub const BIND_ENV: &str = "CLICKCAM_BIND";

/// Default upper bound for one encoded frame (4 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialize(String),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Complete daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub detection: DetectionConfig,
    pub capture: CaptureConfig,
}

/// `[server]` - listener and subscriber limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind: SocketAddr,

    /// Maximum live connections per channel
    pub max_subscribers: usize,

    /// Events queued per `/api/ws` subscriber before it counts as not ready
    pub event_queue: usize,

    /// Frames queued per `/api/video` subscriber before it counts as not ready
    pub frame_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_subscribers: 32,
            event_queue: 32,
            frame_queue: 2,
        }
    }
}

/// Which hardware observation mechanism feeds the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Watch a device directory for newly connected input devices
    #[default]
    DeviceDirectory,

    /// Decode button presses from the mouse multiplexer
    InputEvents,

    /// No detection; video relay only
    #[serde(rename = "none")]
    Disabled,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceDirectory => "device_directory",
            Self::InputEvents => "input_events",
            Self::Disabled => "none",
        }
    }
}

/// `[detection]` - detector and source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub source: SourceKind,

    /// Directory scanned by the device-directory source
    pub device_dir: PathBuf,

    /// Entry prefix counted by the device-directory source
    pub device_prefix: String,

    /// Mouse multiplexer read by the input-event source
    pub mouse_device: PathBuf,

    /// Poll/retry cadence for sources, in milliseconds
    pub poll_interval_ms: u64,

    /// Suppression window after a click, in seconds
    pub cooldown_secs: u64,

    pub rearm: RearmPolicy,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            device_dir: PathBuf::from("/dev/input"),
            device_prefix: "event".to_string(),
            mouse_device: PathBuf::from("/dev/input/mice"),
            poll_interval_ms: 1000,
            cooldown_secs: 10,
            rearm: RearmPolicy::default(),
        }
    }
}

impl DetectionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// `[capture]` - external capture process settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,

    /// Capture program, looked up on `PATH`
    pub program: String,

    /// Input demuxer passed to `-f` before the device
    pub input_format: String,

    /// Camera device
    pub device: PathBuf,

    /// Pixel/codec format requested from the camera and emitted on stdout
    pub format: String,

    pub framerate: u32,
    pub width: u32,
    pub height: u32,

    /// Delay before restarting a terminated capture process, in seconds
    pub restart_delay_secs: u64,

    /// Partial frames larger than this are discarded
    pub max_frame_bytes: usize,

    /// Extra arguments inserted before the output specification
    pub extra_args: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "ffmpeg".to_string(),
            input_format: "v4l2".to_string(),
            device: PathBuf::from("/dev/video0"),
            format: "mjpeg".to_string(),
            framerate: 15,
            width: 640,
            height: 480,
            restart_delay_secs: 5,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            extra_args: Vec::new(),
        }
    }
}

impl CaptureConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    /// Builds the capture program's argument list.
    ///
    /// The output is a stream of concatenated images on stdout.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            self.input_format.clone(),
            "-input_format".to_string(),
            self.format.clone(),
            "-framerate".to_string(),
            self.framerate.to_string(),
            "-video_size".to_string(),
            format!("{}x{}", self.width, self.height),
            "-i".to_string(),
            self.device.to_string_lossy().to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args.extend(
            ["-f", "image2pipe", "-vcodec", &self.format, "-"]
                .iter()
                .map(|s| s.to_string()),
        );
        args
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Loads configuration following the documented resolution order.
    ///
    /// A missing default file is not an error; a missing explicit file is.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .or_else(|| default_config_path().filter(|p| p.exists())),
        };

        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading config file");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        if let Ok(bind) = env::var(BIND_ENV) {
            config.server.bind = bind
                .parse()
                .map_err(|e| ConfigError::invalid("CLICKCAM_BIND", format!("{bind}: {e}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Rejects values that would stall or break a pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_subscribers == 0 {
            return Err(ConfigError::invalid("server.max_subscribers", "must be at least 1"));
        }
        if self.server.event_queue == 0 {
            return Err(ConfigError::invalid("server.event_queue", "must be at least 1"));
        }
        if self.server.frame_queue == 0 {
            return Err(ConfigError::invalid("server.frame_queue", "must be at least 1"));
        }
        if self.detection.cooldown_secs == 0 {
            return Err(ConfigError::invalid("detection.cooldown_secs", "must be at least 1"));
        }
        if self.detection.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("detection.poll_interval_ms", "must be at least 1"));
        }
        if self.capture.enabled {
            if self.capture.program.trim().is_empty() {
                return Err(ConfigError::invalid("capture.program", "must not be empty"));
            }
            if self.capture.framerate == 0 {
                return Err(ConfigError::invalid("capture.framerate", "must be at least 1"));
            }
            if self.capture.width == 0 || self.capture.height == 0 {
                return Err(ConfigError::invalid(
                    "capture resolution",
                    format!("{}x{} is empty", self.capture.width, self.capture.height),
                ));
            }
            if self.capture.max_frame_bytes == 0 {
                return Err(ConfigError::invalid("capture.max_frame_bytes", "must be at least 1"));
            }
        }
        Ok(())
    }
}

/// Returns `<config dir>/clickcam/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("clickcam").join("config.toml"))
}

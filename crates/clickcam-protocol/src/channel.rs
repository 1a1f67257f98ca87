//! Channel endpoints shared by the server and its consumers.

/// Duplex channel carrying detection events as JSON text.
pub const EVENTS_PATH: &str = "/api/ws";

/// Duplex channel carrying one encoded image per binary message.
pub const VIDEO_PATH: &str = "/api/video";

/// Plain HTTP endpoint returning a status snapshot.
pub const STATUS_PATH: &str = "/api/status";


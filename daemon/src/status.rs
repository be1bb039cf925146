use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::error;

/// Current operational state of the daemon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// No watched game is running; no telemetry session exists.
    Idle,
    /// A telemetry session is live and envelopes are being processed.
    Ingesting,
}

/// Runtime status written by the daemon to %APPDATA%\Scryer\status.toml.
/// The GUI reads this file (read-only) to display daemon state.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    /// Current operational state.
    pub state: DaemonState,
    /// Display name of the game currently being ingested, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_application: Option<String>,
    /// RFC 3339 timestamp of the last session start, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_started: Option<String>,
    /// Envelopes evicted from the ingest queue during the last session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped_envelopes: Option<u64>,
    /// Human-readable error message if the daemon hit a non-fatal error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonStatus {
    /// Constructs the initial idle status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DaemonState::Idle,
            active_application: None,
            session_started: None,
            dropped_envelopes: None,
            error: None,
        }
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// A status write failure is logged; it must never crash the daemon.
pub fn write_status(path: &Path, status: &DaemonStatus) {
    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            error!(dir = %parent.display(), error = %err, "failed to create status directory");
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(err) = std::fs::write(path, content) {
                error!(error = %err, "failed to write status file");
            }
        }
        Err(err) => error!(error = %err, "failed to serialize status"),
    }
}

use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::event::DaemonEvent;
use crate::ingest::BackoffConfig;
use crate::snapshot::Category;

pub const MIN_QUEUE_CAPACITY: usize = 8;
pub const MAX_QUEUE_CAPACITY: usize = 4096;
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_HOTKEY: &str = "Ctrl+F";
pub const DEFAULT_OVERLAY_TITLE: &str = "Scryer Overlay";
/// The local game-events provider.
pub const DEFAULT_FEED_ADDR: &str = "127.0.0.1:5426";
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
pub const DEFAULT_BACKOFF_CEILING_MS: u64 = 30_000;

/// Root configuration structure. Deserialized from %APPDATA%\Scryer\config.toml.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default = "default_applications")]
    pub applications: Vec<ApplicationConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            telemetry: TelemetryConfig::default(),
            applications: default_applications(),
        }
    }
}

/// Settings applied live (hotkey) or at daemon startup (overlay title).
#[derive(Debug, Deserialize)]
pub struct GlobalConfig {
    /// Show/hide hotkey binding (e.g. "Ctrl+F", "F8").
    #[serde(default = "default_hotkey")]
    pub hotkey: String,
    /// Title bar text used to locate the companion overlay window.
    #[serde(default = "default_overlay_title")]
    pub overlay_window_title: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            hotkey: DEFAULT_HOTKEY.to_string(),
            overlay_window_title: DEFAULT_OVERLAY_TITLE.to_string(),
        }
    }
}

/// Telemetry session settings.  Applied when a session starts; a running
/// session keeps the values it started with.
#[derive(Debug, Deserialize)]
pub struct TelemetryConfig {
    /// Address of the local game-events feed.
    #[serde(default = "default_feed_addr")]
    pub feed_addr: String,
    /// Ingest queue capacity. Clamped to [8, 4096].
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_ceiling_ms")]
    pub backoff_ceiling_ms: u64,
    /// Features requested from the feed at session start.
    #[serde(default = "default_features")]
    pub features: Vec<String>,
    /// Categories decoded into the snapshot but never republished.
    #[serde(default = "default_suppressed")]
    pub suppressed_categories: Vec<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            feed_addr: default_feed_addr(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_ceiling_ms: DEFAULT_BACKOFF_CEILING_MS,
            features: default_features(),
            suppressed_categories: default_suppressed(),
        }
    }
}

impl TelemetryConfig {
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.clamp(MIN_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY)
    }

    /// Backoff schedule with the ceiling never below the base.
    pub fn backoff(&self) -> BackoffConfig {
        let base = Duration::from_millis(self.backoff_base_ms.max(1));
        let ceiling = Duration::from_millis(self.backoff_ceiling_ms).max(base);
        BackoffConfig { base, ceiling }
    }

    /// Resolves the suppression list to known categories; unknown names are
    /// logged and skipped.
    pub fn suppressed(&self) -> Vec<Category> {
        self.suppressed_categories
            .iter()
            .filter_map(|name| {
                let category = Category::from_feed_name(name);
                if category.is_none() {
                    warn!(category = %name, "unknown category in suppression list; ignoring");
                }
                category
            })
            .collect()
    }
}

/// Configuration entry for a single watched game.
#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationConfig {
    /// Human-readable name shown in the GUI and the status file.
    pub display_name: String,
    /// Executable filename (e.g. "League of Legends.exe") used for process
    /// detection.
    pub executable_name: String,
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the config
/// file is created or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(err) => {
            error!(error = %err, "failed to create config file watcher");
            return;
        }
    };

    // Watch the parent directory rather than the file directly so we catch
    // editor-style atomic saves (write-new + rename).
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            error!("config path has no parent directory");
            return;
        }
    };

    if let Err(err) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        error!(error = %err, "failed to watch config directory");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "failed to reload config"),
            }
        }
    }
}

fn default_hotkey() -> String {
    DEFAULT_HOTKEY.to_string()
}

fn default_overlay_title() -> String {
    DEFAULT_OVERLAY_TITLE.to_string()
}

fn default_feed_addr() -> String {
    DEFAULT_FEED_ADDR.to_string()
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}

fn default_backoff_ceiling_ms() -> u64 {
    DEFAULT_BACKOFF_CEILING_MS
}

/// The feature set the original companion requests from the feed.
fn default_features() -> Vec<String> {
    [
        "gep_internal",
        "game_info",
        "live_client_data",
        "me",
        "match_info",
        "roster",
        "store",
        "board",
        "bench",
        "carousel",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Carousel contents refresh far faster than any consumer cares about.
fn default_suppressed() -> Vec<String> {
    vec!["carousel".to_string()]
}

fn default_applications() -> Vec<ApplicationConfig> {
    vec![ApplicationConfig {
        display_name: "Teamfight Tactics".to_string(),
        executable_name: "League of Legends.exe".to_string(),
    }]
}

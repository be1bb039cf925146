mod config;
mod error;
mod event;
mod feed;
mod filter;
mod hotkey;
mod ingest;
mod normalize;
mod paths;
mod process_monitor;
mod protocol;
mod queue;
mod session;
mod sink;
mod snapshot;
mod status;
mod subscription;
mod toggle;
mod window;

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::sink::{Sink, Update};
use crate::toggle::HotkeyToggleController;
use crate::window::OverlayWindow;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── App data directory ────────────────────────────────────────────────────
    let app_dir = paths::app_data_dir();
    if let Err(err) = std::fs::create_dir_all(&app_dir) {
        error!(dir = %app_dir.display(), error = %err, "failed to create app data directory");
        std::process::exit(1);
    }

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path();
    let initial_config = config::load_or_default(&config_path).unwrap_or_else(|err| {
        error!(error = %err, "config error; using defaults");
        config::Config::default()
    });
    let initial_hotkey = initial_config.global.hotkey.clone();
    let overlay_title = initial_config.global.overlay_window_title.clone();
    let shared_config = Arc::new(RwLock::new(initial_config));

    // ── Initial status ────────────────────────────────────────────────────────
    let status_path = paths::status_file_path();
    let mut current_status = status::DaemonStatus::new();
    status::write_status(&status_path, &current_status);

    // ── Downstream sink ───────────────────────────────────────────────────────
    // The UI renderer subscribes out of process; in the daemon itself a
    // diagnostic exporter traces everything that gets published.
    let sink = Arc::new(Sink::new());
    sink.subscribe(Box::new(|update: &Update| {
        match update {
            Update::Delta(delta) => {
                debug!(tick = delta.tick, categories = delta.entries.len(), "published delta");
            }
            Update::Event(event) => {
                debug!(name = %event.name, "published event");
            }
        }
        Ok(())
    }));

    let (event_tx, mut event_rx) = mpsc::channel::<event::DaemonEvent>(32);

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));
    tokio::spawn(process_monitor::run(Arc::clone(&shared_config), event_tx.clone()));

    let hotkey_handle = hotkey::start(&initial_hotkey, event_tx.clone());

    let chrome = Arc::new(OverlayWindow::new(overlay_title));
    let toggle_controller = HotkeyToggleController::new(chrome);

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(event::DaemonEvent::Shutdown).await;
            }
        });
    }

    info!(version = env!("CARGO_PKG_VERSION"), "scryer-daemon started");

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut active_session: Option<session::Session> = None;

    while let Some(evt) = event_rx.recv().await {
        match evt {
            event::DaemonEvent::GameStarted(app) => {
                if let Some(s) = active_session.take() {
                    s.stop().await;
                }

                info!(game = %app.display_name, "telemetry session started");
                current_status.state = status::DaemonState::Ingesting;
                current_status.active_application = Some(app.display_name.clone());
                current_status.session_started = Some(chrono::Local::now().to_rfc3339());
                current_status.dropped_envelopes = None;
                current_status.error = None;
                status::write_status(&status_path, &current_status);

                let cfg = shared_config.read().await;
                active_session = Some(session::Session::start(&app, &cfg, Arc::clone(&sink)));
            }

            event::DaemonEvent::GameStopped => {
                if let Some(s) = active_session.take() {
                    let ticks = s.snapshot().read().await.tick();
                    let dropped = s.stop().await;
                    info!(ticks, dropped, "session ended");
                    current_status.dropped_envelopes = Some(dropped);
                }

                info!("telemetry session stopped");
                current_status.state = status::DaemonState::Idle;
                current_status.active_application = None;
                status::write_status(&status_path, &current_status);
            }

            event::DaemonEvent::ConfigReloaded(new_config) => {
                info!("config reloaded");
                // The hotkey rebinds live; session-scoped settings apply to
                // the next session.
                hotkey_handle.update_binding(&new_config.global.hotkey);
                *shared_config.write().await = new_config;
            }

            event::DaemonEvent::ToggleRequested => {
                // Overlapping triggers are dropped by the controller's
                // in-flight guard.
                toggle_controller.trigger();
            }

            event::DaemonEvent::Shutdown => {
                info!("shutting down");
                if let Some(s) = active_session.take() {
                    s.stop().await;
                }
                current_status.state = status::DaemonState::Idle;
                current_status.active_application = None;
                current_status.error = None;
                status::write_status(&status_path, &current_status);
                break;
            }
        }
    }

    hotkey_handle.stop();
}

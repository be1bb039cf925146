use std::sync::Arc;
use sysinfo::{ProcessesToUpdate, System};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Duration};
use tracing::info;

use crate::config::Config;
use crate::event::DaemonEvent;

const POLL_INTERVAL_SECS: u64 = 2;

/// Polls the OS process list every [`POLL_INTERVAL_SECS`] seconds and emits
/// [`DaemonEvent::GameStarted`] / [`DaemonEvent::GameStopped`] whenever a
/// watched game executable appears or disappears.
///
/// Only one game is considered active at a time.  If several watched
/// executables run simultaneously, the first match in the config list wins.
pub async fn run(config: Arc<RwLock<Config>>, tx: mpsc::Sender<DaemonEvent>) {
    let mut sys = System::new();
    let mut active_exe: Option<String> = None;
    let mut ticker = interval(Duration::from_secs(POLL_INTERVAL_SECS));

    loop {
        ticker.tick().await;

        sys.refresh_processes(ProcessesToUpdate::All, false);

        let config = config.read().await;
        let found = config
            .applications
            .iter()
            .find(|app| {
                let target = app.executable_name.to_lowercase();
                sys.processes()
                    .values()
                    .any(|p| p.name().to_string_lossy().to_lowercase() == target)
            })
            .cloned();

        // Release the read lock before any awaits below.
        drop(config);

        match (active_exe.as_ref(), found) {
            (None, Some(app)) => {
                info!(game = %app.display_name, "watched game detected");
                active_exe = Some(app.executable_name.clone());
                if tx.send(DaemonEvent::GameStarted(app)).await.is_err() {
                    break;
                }
            }
            (Some(exe), None) => {
                info!(exe = %exe, "watched game exited");
                active_exe = None;
                if tx.send(DaemonEvent::GameStopped).await.is_err() {
                    break;
                }
            }
            _ => {} // No change.
        }
    }
}

/// One telemetry session, alive while a watched game is running.
///
/// A `Session` owns the two tasks of the ingestion path:
///   - the feed client (socket, handshake, push delivery)
///   - the ingest worker (queue drain, normalize, filter, publish)
///
/// The snapshot is shared single-writer/multi-reader: the worker holds the
/// write side, everyone else reads.  The hotkey/toggle path is fully
/// independent of the session and keeps running between games.
use std::sync::Arc;

use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

use crate::config::{ApplicationConfig, Config};
use crate::feed;
use crate::filter::UpdateFilter;
use crate::ingest::{IngestWorker, IngestorHandle};
use crate::sink::Sink;
use crate::snapshot::NormalizedSnapshot;
use crate::subscription::{FeatureRequest, FeatureSubscriptionManager};

/// A running ingestion session.
pub struct Session {
    /// Setting this to `true` signals both tasks to stop.
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    ingest: IngestorHandle,
    snapshot: Arc<RwLock<NormalizedSnapshot>>,
}

impl Session {
    /// Starts the session for `app` using `config`, publishing into `sink`.
    pub fn start(app: &ApplicationConfig, config: &Config, sink: Arc<Sink>) -> Self {
        let telemetry = &config.telemetry;
        let (stop_tx, stop_rx) = watch::channel(false);
        let (request_tx, request_rx) = mpsc::channel::<FeatureRequest>(4);

        let ingest = IngestorHandle::new(telemetry.effective_queue_capacity());
        let snapshot = Arc::new(RwLock::new(NormalizedSnapshot::new()));

        let mut handles = Vec::new();

        // ── Feed client task ──────────────────────────────────────────────────
        handles.push(feed::spawn(
            telemetry.feed_addr.clone(),
            request_rx,
            ingest.clone(),
            stop_rx.clone(),
        ));

        // ── Ingest worker task ────────────────────────────────────────────────
        let worker = IngestWorker {
            handle: ingest.clone(),
            manager: FeatureSubscriptionManager::new(telemetry.features.clone(), request_tx),
            snapshot: Arc::clone(&snapshot),
            filter: UpdateFilter::new(&telemetry.suppressed()),
            sink,
            backoff: telemetry.backoff(),
            stop: stop_rx,
        };
        tracing::info!(app = %app.display_name, addr = %telemetry.feed_addr, "telemetry session starting");
        handles.push(tokio::spawn(worker.run()));

        Session {
            stop_tx,
            handles,
            ingest,
            snapshot,
        }
    }

    /// Read access to the live snapshot (the worker remains the only writer).
    pub fn snapshot(&self) -> Arc<RwLock<NormalizedSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    /// Envelopes evicted from the ingest queue so far.
    pub fn dropped_items(&self) -> u64 {
        self.ingest.dropped_items()
    }

    /// Signals both tasks to stop and waits for them to finish.
    /// Returns the final eviction count for the status file.
    pub async fn stop(self) -> u64 {
        let _ = self.stop_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        self.ingest.dropped_items()
    }
}

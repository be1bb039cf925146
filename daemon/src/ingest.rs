//! Envelope ingestion: non-blocking feed callbacks in front of a single
//! drain worker.
//!
//! The feed's delivery task calls [`IngestorHandle`] methods which only
//! enqueue onto a bounded drop-oldest queue and return; decoding never runs
//! on the delivery path.  One [`IngestWorker`] drains the queue in arrival
//! order, applies the normalizer and filter, and publishes through the sink.
//!
//! The worker also owns the resubscription policy: a transport error pauses
//! ingestion and re-issues the feature request with exponential backoff
//! (base delay, capped ceiling, jitter) until the feed answers again.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{watch, Notify, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::FeedDisconnect;
use crate::filter::UpdateFilter;
use crate::normalize;
use crate::protocol::{DiscreteEvent, RawEnvelope};
use crate::queue::BoundedQueue;
use crate::sink::{Sink, Update};
use crate::snapshot::{NormalizedSnapshot, SnapshotDelta};
use crate::subscription::FeatureSubscriptionManager;

/// Resubscription backoff parameters.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub ceiling: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            ceiling: Duration::from_secs(30),
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (0-based): exponential from the
    /// base, capped at the ceiling, plus a random jitter of up to a quarter
    /// of the capped delay so concurrent clients do not reconnect in step.
    fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
            .min(self.ceiling);
        let jitter_ceiling = (exp / 4).as_millis() as u64;
        let jitter = if jitter_ceiling == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ceiling)
        };
        exp + Duration::from_millis(jitter)
    }
}

/// One entry in the ingest queue, preserving the arrival order across both
/// inbound channels.
#[derive(Debug)]
enum FeedItem {
    Info(RawEnvelope),
    Events(Vec<DiscreteEvent>),
}

struct Shared {
    queue: Mutex<BoundedQueue<FeedItem>>,
    wakeup: Notify,
    disconnect: Mutex<Option<FeedDisconnect>>,
}

/// Inbound side of the ingestion queue, handed to the feed task.
///
/// All methods enqueue and return immediately; they are safe to call from
/// the feed's delivery task without stalling it.
#[derive(Clone)]
pub struct IngestorHandle {
    shared: Arc<Shared>,
}

impl IngestorHandle {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(BoundedQueue::new(capacity)),
                wakeup: Notify::new(),
                disconnect: Mutex::new(None),
            }),
        }
    }

    /// Periodic or change-triggered category update from the feed.
    pub fn on_info_update(&self, envelope: RawEnvelope) {
        self.enqueue(FeedItem::Info(envelope));
    }

    /// Batch of discrete named events from the feed.
    pub fn on_new_events(&self, events: Vec<DiscreteEvent>) {
        self.enqueue(FeedItem::Events(events));
    }

    /// Transport-level loss reported by the feed task.  Ingestion pauses at
    /// the worker until resubscription succeeds.
    pub fn on_transport_error(&self, err: FeedDisconnect) {
        *self.shared.disconnect.lock().unwrap() = Some(err);
        self.shared.wakeup.notify_one();
    }

    /// Total envelopes/event batches evicted by the drop-oldest policy.
    pub fn dropped_items(&self) -> u64 {
        self.shared.queue.lock().unwrap().dropped()
    }

    /// Number of items waiting in the queue right now.
    pub fn queued_len(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    #[cfg(test)]
    pub(crate) fn has_disconnect(&self) -> bool {
        self.shared.disconnect.lock().unwrap().is_some()
    }

    fn enqueue(&self, item: FeedItem) {
        {
            let mut queue = self.shared.queue.lock().unwrap();
            if queue.push(item) {
                debug!(dropped_total = queue.dropped(), "ingest queue full; dropped oldest");
            }
        }
        self.shared.wakeup.notify_one();
    }

    fn pop(&self) -> Option<FeedItem> {
        self.shared.queue.lock().unwrap().pop()
    }

    fn take_disconnect(&self) -> Option<FeedDisconnect> {
        self.shared.disconnect.lock().unwrap().take()
    }

    async fn wait(&self) {
        self.shared.wakeup.notified().await;
    }
}

/// Single consumer of the ingest queue; the only writer of the snapshot.
pub struct IngestWorker {
    pub handle: IngestorHandle,
    pub manager: FeatureSubscriptionManager,
    pub snapshot: Arc<RwLock<NormalizedSnapshot>>,
    pub filter: UpdateFilter,
    pub sink: Arc<Sink>,
    pub backoff: BackoffConfig,
    pub stop: watch::Receiver<bool>,
}

impl IngestWorker {
    /// Runs until the stop signal fires.  Envelopes delivered before the
    /// feature request resolves sit in the bounded queue (that queue is the
    /// pre-confirmation buffer) and are drained afterwards in arrival
    /// order.
    pub async fn run(mut self) {
        if !self.subscribe_with_backoff().await {
            return;
        }

        loop {
            // A transport loss pauses ingestion: nothing is drained until the
            // resubscription goes through.  Queued items survive the pause.
            if let Some(err) = self.handle.take_disconnect() {
                warn!(error = %err, "feed transport lost; pausing ingestion");
                self.manager.mark_failed();
                if !self.subscribe_with_backoff().await {
                    return;
                }
            }

            while let Some(item) = self.handle.pop() {
                self.process(item).await;
            }

            tokio::select! {
                _ = self.stop.changed() => {
                    if *self.stop.borrow() {
                        debug!("ingest worker stopping");
                        return;
                    }
                }
                _ = self.handle.wait() => {}
            }
        }
    }

    /// Issues the feature request, retrying with exponential backoff until
    /// it succeeds.  Returns false if the stop signal fired first.
    async fn subscribe_with_backoff(&mut self) -> bool {
        let mut attempt: u32 = 0;
        loop {
            let outcome = tokio::select! {
                _ = self.stop.changed() => {
                    if *self.stop.borrow() {
                        return false;
                    }
                    continue;
                }
                outcome = self.manager.request_features() => outcome,
            };

            match outcome {
                Ok(grant) => {
                    info!(
                        supported = grant.supported.len(),
                        unsupported = grant.unsupported.len(),
                        "feature subscription ready",
                    );
                    if !grant.unsupported.is_empty() {
                        warn!(features = ?grant.unsupported, "feed does not support all requested features");
                    }
                    return true;
                }
                Err(err) => {
                    let delay = self.backoff.delay(attempt);
                    if attempt == 0 {
                        error!(error = %err, retry_in = ?delay, "feature request failed");
                    } else {
                        warn!(error = %err, attempt, retry_in = ?delay, "feature request failed; backing off");
                    }
                    attempt = attempt.saturating_add(1);
                    tokio::select! {
                        _ = self.stop.changed() => {
                            if *self.stop.borrow() {
                                return false;
                            }
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn process(&mut self, item: FeedItem) {
        match item {
            FeedItem::Info(envelope) => {
                let delta = {
                    let mut snapshot = self.snapshot.write().await;
                    let changed = normalize::apply(&mut snapshot, &envelope);
                    let entries = self
                        .filter
                        .publishable(&changed)
                        .into_iter()
                        .filter_map(|category| {
                            snapshot
                                .get(category)
                                .map(|value| (category, value.clone()))
                        })
                        .collect::<Vec<_>>();
                    SnapshotDelta {
                        tick: snapshot.tick(),
                        entries,
                    }
                };
                if !delta.entries.is_empty() {
                    self.sink.publish(&Update::Delta(delta));
                }
            }
            FeedItem::Events(events) => {
                for event in events {
                    self.sink.publish(&Update::Event(event));
                }
            }
        }
    }
}

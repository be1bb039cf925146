//! Feature subscription handshake with the feed.
//!
//! The session's feature set is fixed at construction.  Requests go to the
//! feed task over an `mpsc` channel and are answered on a `oneshot`, so the
//! manager never touches the socket itself and tests can stand in a fake
//! responder.

use std::collections::BTreeSet;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::SubscriptionError;

/// Lifecycle of the session's feature subscription.  Transitions once per
/// session and is then frozen, except for `Failed → Requested` on a backoff
/// retry after a transport loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unrequested,
    Requested,
    Confirmed,
    PartiallySupported,
    Failed,
}

/// The feed's answer to a feature request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureGrant {
    pub supported: BTreeSet<String>,
    pub unsupported: BTreeSet<String>,
}

impl FeatureGrant {
    pub fn from_lists(supported: Vec<String>, unsupported: Vec<String>) -> Self {
        Self {
            supported: supported.into_iter().collect(),
            unsupported: unsupported.into_iter().collect(),
        }
    }
}

/// A feature request in flight to the feed task.
#[derive(Debug)]
pub struct FeatureRequest {
    pub features: Vec<String>,
    pub reply: oneshot::Sender<Result<FeatureGrant, SubscriptionError>>,
}

pub struct FeatureSubscriptionManager {
    requests: mpsc::Sender<FeatureRequest>,
    features: Vec<String>,
    state: SubscriptionState,
    grant: Option<FeatureGrant>,
}

impl FeatureSubscriptionManager {
    pub fn new(features: Vec<String>, requests: mpsc::Sender<FeatureRequest>) -> Self {
        Self {
            requests,
            features,
            state: SubscriptionState::Unrequested,
            grant: None,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// The confirmed grant, if the request already succeeded this session.
    pub fn grant(&self) -> Option<&FeatureGrant> {
        self.grant.as_ref()
    }

    /// Requests the session's feature set from the feed.
    ///
    /// Idempotent: once a grant is held, repeated calls return it without
    /// another round trip.  On failure the state moves to `Failed` and the
    /// error is returned to the caller without any retry here; the
    /// ingest worker owns the backoff policy.
    pub async fn request_features(&mut self) -> Result<FeatureGrant, SubscriptionError> {
        if let Some(grant) = &self.grant {
            debug!("feature request already confirmed; returning cached grant");
            return Ok(grant.clone());
        }

        self.state = SubscriptionState::Requested;
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = FeatureRequest {
            features: self.features.clone(),
            reply: reply_tx,
        };
        if self.requests.send(request).await.is_err() {
            self.state = SubscriptionState::Failed;
            return Err(SubscriptionError::ChannelClosed);
        }

        match reply_rx.await {
            Ok(Ok(grant)) => {
                self.state = if grant.unsupported.is_empty() {
                    SubscriptionState::Confirmed
                } else {
                    SubscriptionState::PartiallySupported
                };
                self.grant = Some(grant.clone());
                Ok(grant)
            }
            Ok(Err(err)) => {
                self.state = SubscriptionState::Failed;
                Err(err)
            }
            Err(_) => {
                self.state = SubscriptionState::Failed;
                Err(SubscriptionError::ChannelClosed)
            }
        }
    }

    /// Invalidates the cached grant after a transport loss so the next
    /// `request_features` call issues a real request again.
    pub fn mark_failed(&mut self) {
        self.state = SubscriptionState::Failed;
        self.grant = None;
    }
}

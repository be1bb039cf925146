//! Client for the local game-events feed.
//!
//! The feed speaks line-delimited JSON over TCP (see [`crate::protocol`]).
//! This task owns the socket: it connects lazily when a feature request
//! arrives, performs the `set_required_features` handshake, then forwards
//! pushed messages to the [`IngestorHandle`] until the connection drops.
//! Reconnection is not decided here: a transport loss is reported to the
//! ingest worker, whose backoff loop issues the next feature request, which
//! brings this task back around to a fresh connect.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{FeedDisconnect, SubscriptionError};
use crate::ingest::IngestorHandle;
use crate::protocol::{ClientMessage, FeedMessage};
use crate::subscription::{FeatureGrant, FeatureRequest};

pub fn spawn(
    addr: String,
    requests: mpsc::Receiver<FeatureRequest>,
    ingest: IngestorHandle,
    stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run(addr, requests, ingest, stop))
}

async fn run(
    addr: String,
    mut requests: mpsc::Receiver<FeatureRequest>,
    ingest: IngestorHandle,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let request = tokio::select! {
            _ = stop.changed() => {
                if *stop.borrow() {
                    return;
                }
                continue;
            }
            request = requests.recv() => match request {
                Some(request) => request,
                // Session torn down; nothing left to serve.
                None => return,
            },
        };

        let stream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(err) => {
                debug!(addr = %addr, error = %err, "feed connect failed");
                let _ = request
                    .reply
                    .send(Err(SubscriptionError::FeedUnreachable(err.to_string())));
                continue;
            }
        };

        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        // A feed that accepts the connection but never answers must not be
        // able to wedge session teardown.
        let outcome = tokio::select! {
            _ = stop.changed() => {
                if *stop.borrow() {
                    return;
                }
                continue;
            }
            outcome = handshake(&mut write_half, &mut lines, &request.features) => outcome,
        };
        match outcome {
            Ok(grant) => {
                info!(addr = %addr, "feed connected");
                let _ = request.reply.send(Ok(grant));
            }
            Err(err) => {
                let _ = request.reply.send(Err(err));
                continue;
            }
        }

        // Push loop: forward everything to the ingest queue until the
        // connection drops or the session stops.
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        return;
                    }
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => dispatch(&line, &ingest),
                    Ok(None) => {
                        ingest.on_transport_error(FeedDisconnect::new(
                            "feed closed the connection",
                        ));
                        break;
                    }
                    Err(err) => {
                        ingest.on_transport_error(FeedDisconnect::new(err.to_string()));
                        break;
                    }
                },
            }
        }
    }
}

async fn handshake(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    lines: &mut tokio::io::Lines<BufReader<OwnedReadHalf>>,
    features: &[String],
) -> Result<FeatureGrant, SubscriptionError> {
    let request = serde_json::to_string(&ClientMessage::SetRequiredFeatures { features })
        .map_err(|err| SubscriptionError::Rejected(format!("encode failed: {err}")))?;
    write_half
        .write_all(request.as_bytes())
        .await
        .map_err(|err| SubscriptionError::FeedUnreachable(err.to_string()))?;
    write_half
        .write_all(b"\n")
        .await
        .map_err(|err| SubscriptionError::FeedUnreachable(err.to_string()))?;

    let line = lines
        .next_line()
        .await
        .map_err(|err| SubscriptionError::FeedUnreachable(err.to_string()))?
        .ok_or_else(|| {
            SubscriptionError::FeedUnreachable("feed closed during handshake".to_string())
        })?;

    match serde_json::from_str::<FeedMessage>(&line) {
        Ok(FeedMessage::FeaturesSet { supported, unsupported }) => {
            Ok(FeatureGrant::from_lists(supported, unsupported))
        }
        Ok(_) => Err(SubscriptionError::Rejected(
            "feed answered the handshake with a non-handshake message".to_string(),
        )),
        Err(err) => Err(SubscriptionError::Rejected(format!(
            "unparseable handshake answer: {err}"
        ))),
    }
}

/// Routes one pushed line.  Unparseable lines are logged and skipped so a
/// schema addition on the feed side never kills the connection.
fn dispatch(line: &str, ingest: &IngestorHandle) {
    match serde_json::from_str::<FeedMessage>(line) {
        Ok(FeedMessage::InfoUpdate { info }) => ingest.on_info_update(info),
        Ok(FeedMessage::Events { events }) => ingest.on_new_events(events),
        Ok(FeedMessage::FeaturesSet { .. }) => {
            debug!("ignoring unexpected features_set outside a handshake");
        }
        Err(err) => {
            warn!(error = %err, excerpt = %line_excerpt(line), "skipping unparseable feed line");
        }
    }
}

fn line_excerpt(line: &str) -> &str {
    let mut cut = line.len().min(120);
    while !line.is_char_boundary(cut) {
        cut -= 1;
    }
    &line[..cut]
}

//! Wire format of the local game-events feed.
//!
//! The feed is a line-delimited JSON stream: the daemon sends a single
//! `set_required_features` request after connecting and the feed answers with
//! `features_set`, then pushes `info_update` and `events` messages until the
//! connection drops.  The envelope schema is owned by the feed, not by us:
//! unknown categories and fields must pass through deserialization untouched
//! so the normalizer can decide what to ignore.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw field map of one category inside an envelope: field name → raw string.
/// Several fields (`*_pieces`, `xp`) hold JSON-encoded collections as strings
/// and are decoded a second time by the normalizer.
pub type CategoryFields = BTreeMap<String, String>;

/// One push delivery from the feed: category name → raw fields.
/// A category absent from the envelope means "no news this tick", never
/// "cleared".
pub type RawEnvelope = BTreeMap<String, CategoryFields>;

/// A named event from the feed's discrete event stream (e.g. `round_start`).
/// Consumed within one pipeline pass; never stored in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteEvent {
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Messages the daemon sends to the feed.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage<'a> {
    SetRequiredFeatures { features: &'a [String] },
}

/// Messages the feed pushes to the daemon.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// Answer to `set_required_features`.
    FeaturesSet {
        #[serde(default)]
        supported: Vec<String>,
        #[serde(default)]
        unsupported: Vec<String>,
    },
    /// Periodic or change-triggered category update.
    InfoUpdate { info: RawEnvelope },
    /// Batch of discrete named events.
    Events { events: Vec<DiscreteEvent> },
}

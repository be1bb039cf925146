//! Typed snapshot of the match state, rebuilt incrementally from feed
//! envelopes.
//!
//! The snapshot lives for the whole telemetry session and is written by the
//! drain worker only; each processed envelope advances the logical tick even
//! when no field changed.

use std::collections::{BTreeMap, BTreeSet};

/// A known telemetry category.  Unknown category names in an envelope are
/// ignored by the normalizer so the feed schema can grow under us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Me,
    MatchInfo,
    Store,
    Board,
    Bench,
    Carousel,
    Roster,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Me,
        Category::MatchInfo,
        Category::Store,
        Category::Board,
        Category::Bench,
        Category::Carousel,
        Category::Roster,
    ];

    /// The category name as it appears in feed envelopes.
    pub fn feed_name(self) -> &'static str {
        match self {
            Category::Me => "me",
            Category::MatchInfo => "match_info",
            Category::Store => "store",
            Category::Board => "board",
            Category::Bench => "bench",
            Category::Carousel => "carousel",
            Category::Roster => "roster",
        }
    }

    pub fn from_feed_name(name: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.feed_name() == name)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.feed_name())
    }
}

/// Local player stats.  The feed delivers these field-by-field, so every
/// field is optional until it has been seen at least once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerStatus {
    pub gold: Option<u32>,
    pub health: Option<u32>,
    /// Parsed out of the JSON-encoded `xp` field.
    pub level: Option<u32>,
    /// The `xp` field exactly as the feed sent it, for consumers that want
    /// the full progression blob.
    pub xp_raw: Option<String>,
    pub rank: Option<u32>,
}

/// Match-level state (mode, current round type, damage dealt this round).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchState {
    pub mode: Option<String>,
    pub round_type: Option<String>,
    pub local_damage: Option<u32>,
}

/// One unit as reported inside a `*_pieces` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRef {
    pub id: String,
    pub name: String,
    pub level: u32,
    pub items: Vec<String>,
}

/// An ordered set of units (shop, board, bench or carousel contents).
/// Always rebuilt wholesale from the nested JSON payload; never merged with
/// the previous collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitCollection {
    pub units: Vec<UnitRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub player_id: String,
    pub health: Option<u32>,
    pub rank: Option<u32>,
}

/// Status of every player in the lobby.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    pub entries: Vec<RosterEntry>,
}

/// The decoded value of one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategorySnapshot {
    Player(PlayerStatus),
    Match(MatchState),
    Units(UnitCollection),
    Roster(Roster),
}

/// Latest known decoded value per category plus a logical tick counter and
/// per-category staleness flags.
///
/// A stale category is one whose most recent decode failed; its retained
/// value may not reflect the current tick.  The flag clears on the next
/// successful decode of that category.
#[derive(Debug, Default)]
pub struct NormalizedSnapshot {
    tick: u64,
    values: BTreeMap<Category, CategorySnapshot>,
    stale: BTreeSet<Category>,
}

impl NormalizedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical tick of the most recently processed envelope.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn get(&self, category: Category) -> Option<&CategorySnapshot> {
        self.values.get(&category)
    }

    pub fn is_stale(&self, category: Category) -> bool {
        self.stale.contains(&category)
    }

    /// Advances the tick.  Called once per processed envelope, before any
    /// category is applied, so the counter increases strictly even when
    /// nothing changes.
    pub(crate) fn advance_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Replaces a category's value wholesale and clears its staleness flag.
    pub(crate) fn replace(&mut self, category: Category, value: CategorySnapshot) {
        self.values.insert(category, value);
        self.stale.remove(&category);
    }

    /// Marks a category stale, keeping whatever value it had.
    pub(crate) fn mark_stale(&mut self, category: Category) {
        self.stale.insert(category);
    }
}

/// The publishable outcome of one envelope: the categories that changed this
/// tick, with their new values.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDelta {
    pub tick: u64,
    pub entries: Vec<(Category, CategorySnapshot)>,
}
